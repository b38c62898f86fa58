//! Route handlers.
//!
//! Handlers return `Result<_, RelayError>`; the error's `IntoResponse` impl
//! picks the status code and renders `{ "error": ... }`.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{ProviderError, RelayError, Result};
use crate::services::markdown_of;
use crate::services::telegram::{secret_matches, webhook_url, TelegramUpdate, SECRET_HEADER};
use crate::utils::string::{preview, truncate_chars};

use super::prompts::{self, GrantOutline};
use super::AppState;

// ============================================================================
// Extractor
// ============================================================================

/// `Json<T>` whose rejection is a 400 `{ "error": ... }` body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(RelayError::BadRequest(rejection.body_text())),
        }
    }
}

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EchoRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FindPeopleRequest {
    #[serde(default)]
    pub requirements: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NsfGrantRequest {
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default)]
    pub research_objectives: Option<String>,
    #[serde(default)]
    pub methodology: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
}

/// A present, non-blank string field.
fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::BadRequest(message.to_string()))
}

/// Log upstream failures before they become a 500.
fn log_failure(route: &'static str) -> impl Fn(RelayError) -> RelayError {
    move |err| {
        if err.status().is_server_error() {
            error!(route = route, error = %err, "Request failed");
        }
        err
    }
}

/// Markdown body of a scrape result, or an upstream error if it has none.
fn scraped_markdown(result: &Value) -> Result<&str> {
    markdown_of(result).ok_or_else(|| {
        ProviderError::Unknown("scrape result carried no markdown".to_string()).into()
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /echo`
pub async fn echo(JsonBody(body): JsonBody<EchoRequest>) -> Json<Value> {
    Json(json!({ "message": body.text.unwrap_or_default() }))
}

/// `POST /crawl`: scrape a URL and return the result document.
pub async fn crawl(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UrlRequest>,
) -> Result<Json<Value>> {
    let url = required(&body.url, "URL is required")?;
    info!(url = url, "Crawl requested");

    let result = state.scrape(url).await.map_err(log_failure("crawl"))?;
    Ok(Json(result))
}

/// `POST /findpeople`: scrape the people directory and match it against requirements.
///
/// Responds with the scrape result plus the model's answer under `matches`.
pub async fn findpeople(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<FindPeopleRequest>,
) -> Result<Json<Value>> {
    let requirements = required(&body.requirements, "requirements is required")?;

    let run = async {
        let result = state.scrape(&state.settings.findpeople_url).await?;
        let (system, user) = prompts::find_people(scraped_markdown(&result)?, requirements);
        let matches = state.complete(&system, &user).await?;

        let result = match result {
            Value::Object(mut object) => {
                object.insert("matches".to_string(), Value::String(matches));
                Value::Object(object)
            }
            other => json!({ "data": other, "matches": matches }),
        };
        Ok::<_, RelayError>(result)
    };

    let result = run.await.map_err(log_failure("findpeople"))?;
    Ok(Json(result))
}

/// `POST /scrape_grant_info`: scrape a grant page and summarize it.
pub async fn scrape_grant_info(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UrlRequest>,
) -> Result<Json<Value>> {
    let url = required(&body.url, "URL is required")?;

    let run = async {
        let result = state.scrape(url).await?;
        let (content, truncated) =
            truncate_chars(scraped_markdown(&result)?, state.settings.grant_max_chars);
        if truncated {
            info!(
                url = url,
                max_chars = state.settings.grant_max_chars,
                "Grant page truncated before analysis"
            );
        }

        let (system, user) = prompts::grant_analysis(&content);
        let analysis = state.complete(&system, &user).await?;

        Ok::<_, RelayError>(json!({
            "analysis": analysis,
            "raw_content": content,
            "truncated": truncated,
        }))
    };

    let response = run.await.map_err(log_failure("scrape_grant_info"))?;
    Ok(Json(response))
}

/// `POST /generate_nsf_grant`: draft a proposal from an outline.
pub async fn generate_nsf_grant(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NsfGrantRequest>,
) -> Result<Json<Value>> {
    let fields = [
        ("project_title", &body.project_title),
        ("research_objectives", &body.research_objectives),
        ("methodology", &body.methodology),
        ("budget", &body.budget),
        ("timeline", &body.timeline),
    ];
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(RelayError::BadRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let outline = GrantOutline {
        project_title: body.project_title.as_deref().unwrap_or_default(),
        research_objectives: body.research_objectives.as_deref().unwrap_or_default(),
        methodology: body.methodology.as_deref().unwrap_or_default(),
        budget: body.budget.as_deref().unwrap_or_default(),
        timeline: body.timeline.as_deref().unwrap_or_default(),
    };
    let (system, user) = prompts::nsf_grant_draft(&outline);

    let draft = state
        .complete(&system, &user)
        .await
        .map_err(log_failure("generate_nsf_grant"))?;
    Ok(Json(json!({ "grant_draft": draft })))
}

/// `POST /webhook`: accept a Telegram update and relay text messages.
///
/// The reply is produced on a spawned task so Telegram gets its answer
/// immediately and does not redeliver the update. At most
/// `settings.max_pending_relays` replies run at once; updates beyond that are
/// acknowledged and dropped.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    if let Some(expected) = &state.settings.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secret_matches(expected, provided) {
            warn!("Webhook call with missing or wrong secret token");
            return Err(RelayError::Unauthorized(
                "invalid webhook secret".to_string(),
            ));
        }
    }

    let update: TelegramUpdate = serde_json::from_slice(&body)
        .map_err(|e| RelayError::BadRequest(format!("Invalid update: {}", e)))?;

    match update.text_message() {
        Some((chat_id, text)) => {
            info!(
                update_id = update.update_id,
                chat_id = chat_id,
                text = %preview(text, 60),
                "Telegram update received"
            );
            if state.messenger.is_some() {
                match state.reserve_relay() {
                    Some(slot) => {
                        let relay = relay_chat(state.clone(), chat_id, text.to_string());
                        tokio::spawn(async move {
                            relay.await;
                            drop(slot);
                        });
                    }
                    None => warn!(
                        update_id = update.update_id,
                        chat_id = chat_id,
                        max_pending = state.settings.max_pending_relays,
                        "Too many chat replies in flight, dropping update"
                    ),
                }
            } else {
                warn!("Telegram update received but no bot token is configured");
            }
        }
        None => info!(update_id = update.update_id, "Ignoring non-text update"),
    }

    Ok(Json(json!({ "ok": true })))
}

/// Complete the chat text and send the answer back to the chat.
async fn relay_chat(state: AppState, chat_id: i64, text: String) {
    let Some(messenger) = state.messenger.clone() else {
        return;
    };

    let (system, user) = prompts::chat_reply(&text);
    let timeout = state.settings.request_timeout;
    let reply = match tokio::time::timeout(timeout, state.complete(&system, &user)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            error!(chat_id = chat_id, error = %e, "Completion for Telegram message failed");
            return;
        }
        Err(_) => {
            warn!(
                chat_id = chat_id,
                timeout_secs = timeout.as_secs(),
                "Chat reply timed out waiting for completion, dropping update"
            );
            return;
        }
    };

    if reply.trim().is_empty() {
        warn!(chat_id = chat_id, "Completion returned no text, nothing to send");
        return;
    }

    if let Err(e) = messenger.send_text(chat_id, &reply).await {
        error!(chat_id = chat_id, error = %e, "Telegram reply failed");
    }
}

/// `GET /set_webhook`: register `{public_url}/webhook` with Telegram.
pub async fn set_webhook(State(state): State<AppState>) -> impl IntoResponse {
    let (Some(messenger), Some(public_url)) = (&state.messenger, &state.settings.public_url)
    else {
        warn!("Webhook setup requested without a bot token or public URL");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Webhook setup failed");
    };

    let url = webhook_url(public_url);
    match messenger
        .register_webhook(&url, state.settings.webhook_secret.as_deref())
        .await
    {
        Ok(()) => (StatusCode::OK, "Webhook setup ok"),
        Err(e) => {
            error!(url = %url, error = %e, "Webhook setup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Webhook setup failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gate::{GateMode, GatePolicy, RateGate};
    use crate::server::{router, Settings};
    use crate::services::{MockCompletionService, MockScrapeService};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(scraper: MockScrapeService, completer: MockCompletionService, settings: Settings) -> axum::Router {
        let gate = RateGate::new(GatePolicy::new(10, Duration::from_secs(60)).unwrap())
            .with_mode(GateMode::Reject);
        let state = AppState::new(
            Arc::new(scraper),
            Arc::new(completer),
            Arc::new(gate),
            settings,
        );
        router(state, &Config::default())
    }

    async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required(&Some(" x ".into()), "m").unwrap(), "x");
        assert!(required(&Some("   ".into()), "m").is_err());
        assert!(required(&None, "m").is_err());
    }

    #[tokio::test]
    async fn test_findpeople_adds_matches() {
        let mut scraper = MockScrapeService::new();
        scraper
            .expect_scrape()
            .withf(|url| url == crate::config::DEFAULT_FINDPEOPLE_SOURCE_URL)
            .times(1)
            .returning(|_| Ok(json!({"markdown": "- Ana, CPR\n- Ben", "metadata": {}})));
        let mut completer = MockCompletionService::new();
        completer
            .expect_complete()
            .withf(|system, user| system.contains("- Ana, CPR") && user.contains("CPR"))
            .times(1)
            .returning(|_, _| Ok("- Ana".to_string()));

        let (status, body) = post(
            app(scraper, completer, Settings::default()),
            "/findpeople",
            json!({"requirements": "CPR"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["markdown"], "- Ana, CPR\n- Ben");
        assert_eq!(body["matches"], "- Ana");
    }

    #[tokio::test]
    async fn test_findpeople_missing_requirements() {
        let (status, body) = post(
            app(MockScrapeService::new(), MockCompletionService::new(), Settings::default()),
            "/findpeople",
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "requirements is required");
    }

    #[tokio::test]
    async fn test_scrape_grant_info_truncates() {
        let mut scraper = MockScrapeService::new();
        scraper
            .expect_scrape()
            .returning(|_| Ok(json!({"markdown": "abcdefghij"})));
        let mut completer = MockCompletionService::new();
        completer
            .expect_complete()
            .withf(|_, user| user.ends_with("abcd"))
            .returning(|_, _| Ok("NSF CAREER, due in May".to_string()));

        let settings = Settings {
            grant_max_chars: 4,
            ..Settings::default()
        };
        let (status, body) = post(
            app(scraper, completer, settings),
            "/scrape_grant_info",
            json!({"url": "https://nsf.gov/funding/career"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["raw_content"], "abcd");
        assert_eq!(body["truncated"], true);
        assert_eq!(body["analysis"], "NSF CAREER, due in May");
    }

    #[tokio::test]
    async fn test_scrape_grant_info_short_page_not_truncated() {
        let mut scraper = MockScrapeService::new();
        scraper
            .expect_scrape()
            .returning(|_| Ok(json!({"markdown": "short"})));
        let mut completer = MockCompletionService::new();
        completer
            .expect_complete()
            .returning(|_, _| Ok("summary".to_string()));

        let (_, body) = post(
            app(scraper, completer, Settings::default()),
            "/scrape_grant_info",
            json!({"url": "https://nsf.gov"}),
        )
        .await;
        assert_eq!(body["raw_content"], "short");
        assert_eq!(body["truncated"], false);
    }

    #[tokio::test]
    async fn test_scrape_without_markdown_is_server_error() {
        let mut scraper = MockScrapeService::new();
        scraper
            .expect_scrape()
            .returning(|_| Ok(json!({"html": "<p>hi</p>"})));

        let (status, body) = post(
            app(scraper, MockCompletionService::new(), Settings::default()),
            "/scrape_grant_info",
            json!({"url": "https://nsf.gov"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("no markdown"));
    }

    #[tokio::test]
    async fn test_generate_nsf_grant_lists_missing_fields() {
        let (status, body) = post(
            app(MockScrapeService::new(), MockCompletionService::new(), Settings::default()),
            "/generate_nsf_grant",
            json!({"project_title": "Soil", "budget": "  "}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Missing required fields: research_objectives, methodology, budget, timeline"
        );
    }

    #[tokio::test]
    async fn test_generate_nsf_grant_returns_draft() {
        let mut completer = MockCompletionService::new();
        completer
            .expect_complete()
            .withf(|_, user| user.contains("Project title: Soil"))
            .times(1)
            .returning(|_, _| Ok("Project Summary ...".to_string()));

        let (status, body) = post(
            app(MockScrapeService::new(), completer, Settings::default()),
            "/generate_nsf_grant",
            json!({
                "project_title": "Soil",
                "research_objectives": "map",
                "methodology": "sequence",
                "budget": "$1",
                "timeline": "1y"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["grant_draft"], "Project Summary ...");
    }

    #[tokio::test]
    async fn test_completion_failure_is_500() {
        let mut completer = MockCompletionService::new();
        completer.expect_complete().returning(|_, _| {
            Err(ProviderError::Auth("Together API error (401): bad key".into()).into())
        });

        let (status, body) = post(
            app(MockScrapeService::new(), completer, Settings::default()),
            "/generate_nsf_grant",
            json!({
                "project_title": "a",
                "research_objectives": "b",
                "methodology": "c",
                "budget": "d",
                "timeline": "e"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("bad key"));
    }

    #[tokio::test]
    async fn test_set_webhook_without_bot_fails() {
        let request = Request::builder()
            .uri("/set_webhook")
            .body(Body::empty())
            .unwrap();
        let response = app(MockScrapeService::new(), MockCompletionService::new(), Settings::default())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Webhook setup failed");
    }
}
