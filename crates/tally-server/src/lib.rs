//! Tally Web Server
//!
//! Axum-based HTTP surface for the tally receipt collection service.
//!
//! - Telegram webhook, checked against the configured secret token
//! - JSON submission endpoint for other transports, bearer-key protected
//! - Health probes
//! - Background flush scheduler and processing worker (see `scheduler`)

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use tally_core::{
    Collaborators, Config, ExtractorClient, GroupProcessor, ImageSource, MemoryImageSource,
    MessageGateway, MockExtractor, ReceiptService, RecordingGateway, Stores, TelegramClient,
    TextExtractor,
};

mod handlers;
mod scheduler;

pub use scheduler::Background;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Header Telegram sets on webhook calls when a secret token is registered
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether the submission endpoint requires an API key (secure by default)
    pub require_auth: bool,
    /// Keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
    /// Expected value of the Telegram secret header; unchecked when None
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            api_keys: vec![],
            webhook_secret: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub service: Arc<ReceiptService>,
    pub extractor: Arc<dyn TextExtractor>,
    pub config: ServerConfig,
}

/// Authentication middleware for the submission API
///
/// API keys are compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        tracing::debug!(path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Constant-time comparison of two secrets
pub(crate) fn secrets_match(provided: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;

    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    // Only compare if lengths match (constant-time for same-length values)
    provided.len() == expected.len() && bool::from(provided.ct_eq(expected))
}

/// Validate an API key against the configured keys
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    valid_keys.iter().any(|key| secrets_match(provided, key))
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/submissions", post(handlers::submit))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/telegram/webhook", post(handlers::telegram_webhook))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Build the collaborators from configuration
///
/// Without a bot token the service runs in dry-run mode: replies are only
/// logged and images can only come from an in-memory source.
pub fn build_collaborators(config: &Config) -> Collaborators {
    let (source, gateway): (Arc<dyn ImageSource>, Arc<dyn MessageGateway>) =
        match config.telegram.token.as_deref() {
            Some(token) => {
                let client = TelegramClient::new(&config.telegram.api_base, token);
                info!(api = %config.telegram.api_base, "Telegram gateway configured");
                (Arc::new(client.clone()), Arc::new(client))
            }
            None => {
                warn!("TELEGRAM_BOT_TOKEN not set, replies are recorded but not delivered");
                (Arc::new(MemoryImageSource::new()), Arc::new(RecordingGateway::new()))
            }
        };

    let extractor = ExtractorClient::from_config(&config.extractor).unwrap_or_else(|| {
        warn!("OCR backend not configured (set OLLAMA_HOST), no amounts will be read from images");
        ExtractorClient::Mock(MockExtractor::fixed(""))
    });

    Collaborators {
        source,
        extractor: Arc::new(extractor),
        gateway,
    }
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    config: Config,
    host: &str,
    port: u16,
    server_config: ServerConfig,
) -> anyhow::Result<()> {
    if !server_config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if server_config.api_keys.is_empty() {
        warn!("No API keys configured (TALLY_API_KEYS), /api/submissions will reject every request");
    }

    let stores = Stores::open(&config)?;
    let collaborators = build_collaborators(&config);
    check_extractor(collaborators.extractor.as_ref()).await;

    let processor = GroupProcessor::new(stores.clone(), collaborators.clone());
    let background = Background::start(
        stores.aggregator.clone(),
        processor,
        config.tick_interval,
        config.keepalive.clone(),
    );

    let state = Arc::new(AppState {
        service: Arc::new(ReceiptService::new(
            stores,
            collaborators.clone(),
            config.decimal_separator,
            config.cities.clone(),
        )),
        extractor: collaborators.extractor,
        config: server_config,
    });

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let token = background.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for shutdown signal");
                    }
                    info!("Shutdown signal received");
                }
                _ = token.cancelled() => {}
            }
        })
        .await?;

    background.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Check and log text extraction backend status
async fn check_extractor(extractor: &dyn TextExtractor) {
    if extractor.health_check().await {
        info!("✅ OCR backend ready: {}", extractor.name());
    } else {
        warn!("⚠️  OCR backend configured but not responding: {}", extractor.name());
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err.into()),
        }
    }
}
