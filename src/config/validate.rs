//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "server",
    "scrape",
    "completion",
    "telegram",
    "cors",
    "rate_limit",
    "grant",
    "findpeople",
    "logging",
];

const KNOWN_RATE_LIMIT: &[&str] = &["max_calls", "period_secs", "mode"];

const KNOWN_TELEGRAM: &[&str] = &["token", "webhook_secret", "public_url", "max_pending_relays"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// True when any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Error)
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, &path, msg));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_raw(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    if let Some(section) = obj.get("rate_limit").and_then(|v| v.as_object()) {
        has_unknown |= check_keys(section, KNOWN_RATE_LIMIT, "rate_limit", &mut diagnostics);
    }
    if let Some(section) = obj.get("telegram").and_then(|v| v.as_object()) {
        has_unknown |= check_keys(section, KNOWN_TELEGRAM, "telegram", &mut diagnostics);
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    diagnostics
}

/// Validate the effective configuration (after environment overrides).
pub fn validate_config(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.rate_limit.max_calls == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "rate_limit.max_calls",
            "Must be greater than zero",
        ));
    }
    if config.rate_limit.period_secs == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "rate_limit.period_secs",
            "Must be greater than zero",
        ));
    }
    if config.server.port == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "server.port",
            "Must be greater than zero",
        ));
    }
    if config.server.request_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "server.request_timeout_secs",
            "Must be greater than zero",
        ));
    }

    if config.scrape.api_key.is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "scrape.api_key",
            "Not set (FIRECRAWL_SECRET_KEY); scrape calls will fail",
        ));
    }
    if config.completion.api_key.is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "completion.api_key",
            "Not set (TOGETHER_SECRET_KEY); completion calls will fail",
        ));
    }

    if config.telegram.token.is_some() {
        if config.telegram.webhook_secret.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                "telegram.webhook_secret",
                "Not set; anyone who finds /webhook can drive the bot",
            ));
        }
        if config.telegram.max_pending_relays == 0 {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "telegram.max_pending_relays",
                "Must be greater than zero",
            ));
        }
        if config.telegram.public_url.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                "telegram.public_url",
                "Not set; the webhook cannot be registered",
            ));
        }
    }

    if config.cors.allowed_origins.is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "cors.allowed_origins",
            "Empty; browsers will be refused on every route",
        ));
    }

    if !has_errors(&diagnostics) {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "Configuration is usable",
        ));
    }

    diagnostics
}
