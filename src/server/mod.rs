//! HTTP server
//!
//! Builds the shared [`AppState`], the axum [`Router`] with its tower-http
//! layers, and runs the serve loop with graceful shutdown.
//!
//! Every outbound scrape and completion call goes through [`AppState::scrape`]
//! and [`AppState::complete`], which admit the call through the shared
//! [`RateGate`] first.

pub mod handlers;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{BoxError, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, CorsConfig};
use crate::error::{RelayError, Result};
use crate::gate::{RateGate, COMPLETION_KEY, SCRAPE_KEY};
use crate::services::{
    CompletionService, FirecrawlClient, Messenger, ScrapeService, TelegramMessenger,
    TogetherClient,
};

// ============================================================================
// Shared State
// ============================================================================

/// Per-endpoint settings read from the configuration at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Expected `X-Telegram-Bot-Api-Secret-Token`; `None` accepts any update
    pub webhook_secret: Option<String>,
    /// Public base URL used to register the webhook
    pub public_url: Option<String>,
    /// Scraped characters forwarded to the model by `/scrape_grant_info`
    pub grant_max_chars: usize,
    /// Directory page scraped by `/findpeople`
    pub findpeople_url: String,
    /// Upper bound on a request, and on a chat reply's wait for completion
    pub request_timeout: Duration,
    /// Chat replies allowed in flight at once
    pub max_pending_relays: usize,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            webhook_secret: config.telegram.webhook_secret.clone(),
            public_url: config.telegram.public_url.clone(),
            grant_max_chars: config.grant.max_content_chars,
            findpeople_url: config.findpeople.source_url.clone(),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            max_pending_relays: config.telegram.max_pending_relays,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<dyn ScrapeService>,
    pub completer: Arc<dyn CompletionService>,
    /// Present only when a bot token is configured
    pub messenger: Option<Arc<dyn Messenger>>,
    pub gate: Arc<RateGate>,
    pub settings: Arc<Settings>,
    relay_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        scraper: Arc<dyn ScrapeService>,
        completer: Arc<dyn CompletionService>,
        gate: Arc<RateGate>,
        settings: Settings,
    ) -> Self {
        // A zero-capacity semaphore would drop every update.
        let relay_slots = Arc::new(Semaphore::new(settings.max_pending_relays.max(1)));
        Self {
            scraper,
            completer,
            messenger: None,
            gate,
            settings: Arc::new(settings),
            relay_slots,
        }
    }

    /// Attach the bot messenger.
    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    /// Wire the real upstream clients and the gate from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = config.gate_policy()?;
        let gate = Arc::new(RateGate::new(policy).with_mode(config.rate_limit.mode));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .build()?;

        let scrape_key = config.scrape.api_key.clone().unwrap_or_else(|| {
            warn!("FIRECRAWL_SECRET_KEY is not set; scrape calls will be refused upstream");
            String::new()
        });
        let completion_key = config.completion.api_key.clone().unwrap_or_else(|| {
            warn!("TOGETHER_SECRET_KEY is not set; completion calls will be refused upstream");
            String::new()
        });

        let scraper = FirecrawlClient::with_client(&scrape_key, &config.scrape.api_base, client.clone());
        let completer = TogetherClient::from_config(&config.completion, &completion_key, client);

        info!(
            scrape = scraper.name(),
            completion = completer.name(),
            model = completer.model(),
            max_calls = policy.max_calls(),
            period_secs = policy.period().as_secs(),
            mode = ?gate.mode(),
            "Upstream services configured"
        );

        let mut state = Self::new(
            Arc::new(scraper),
            Arc::new(completer),
            gate,
            Settings::from_config(config),
        );

        if let Some(token) = &config.telegram.token {
            state = state.with_messenger(Arc::new(TelegramMessenger::new(token)?));
            info!("Telegram relay enabled");
        }

        Ok(state)
    }

    /// Scrape `url` once the scrape gate admits the call.
    pub async fn scrape(&self, url: &str) -> Result<Value> {
        self.gate
            .guard(SCRAPE_KEY, || self.scraper.scrape(url))
            .await
    }

    /// Run a completion once the completion gate admits the call.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.gate
            .guard(COMPLETION_KEY, || self.completer.complete(system, user))
            .await
    }

    /// Claim a slot for a chat reply, or `None` when all slots are busy.
    pub fn reserve_relay(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.relay_slots).try_acquire_owned().ok()
    }

    /// Chat replies currently in flight.
    pub fn pending_relays(&self) -> usize {
        self.settings
            .max_pending_relays
            .max(1)
            .saturating_sub(self.relay_slots.available_permits())
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the application router with CORS, tracing and request timeout layers.
///
/// A request still running after `settings.request_timeout` is dropped, which
/// also cancels any wait at the gate, and answered with a 504 `{error}` body.
pub fn router(state: AppState, config: &Config) -> Router {
    let timeout = state.settings.request_timeout;
    Router::new()
        .route("/health", get(crate::health::health))
        .route("/echo", post(handlers::echo))
        .route("/crawl", post(handlers::crawl))
        .route("/findpeople", post(handlers::findpeople))
        .route("/scrape_grant_info", post(handlers::scrape_grant_info))
        .route("/generate_nsf_grant", post(handlers::generate_nsf_grant))
        .route("/webhook", post(handlers::webhook))
        .route("/set_webhook", get(handlers::set_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    middleware_error(err, timeout)
                }))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http())
}

fn middleware_error(err: BoxError, timeout: Duration) -> RelayError {
    if err.is::<Elapsed>() {
        warn!(timeout_secs = timeout.as_secs(), "Request timed out");
        RelayError::Timeout(timeout)
    } else {
        error!(error = %err, "Unhandled middleware error");
        RelayError::Internal(err.to_string())
    }
}

/// CORS policy from configuration. `*` allows any origin.
fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if cors.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

// ============================================================================
// Serve Loop
// ============================================================================

/// Bind and serve until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let sweeper = spawn_gate_sweeper(Arc::clone(&state.gate));
    let app = router(state.clone(), &config);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!("crawlrelay listening on http://{}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    let pending = state.pending_relays();
    if pending > 0 {
        warn!(pending = pending, "Dropping chat replies still in flight at shutdown");
    }
    served.map_err(RelayError::Io)?;

    info!("crawlrelay stopped");
    Ok(())
}

/// Periodically drop gate keys whose records have all expired.
fn spawn_gate_sweeper(gate: Arc<RateGate>) -> tokio::task::JoinHandle<()> {
    let every = gate.policy().period().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            gate.sweep();
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
