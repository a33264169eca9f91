//! HTTP surface: the purchase-analysis endpoint plus the
//! sync/preferences/reset/consolidate/health secondary endpoints, behind a
//! typed `AppState`, a permissive `CorsLayer`, and `tower_http` tracing.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::baselines::Baselines;
use crate::config::Config;
use crate::cost_tracker::CostTracker;
use crate::error::Result;
use crate::llm::credentials::CredentialSource;
use crate::llm::LlmGateway;
use crate::memory::MemoryStore;
use crate::vector_index::{FlatCosineIndex, VectorIndex};

/// Everything a request handler needs, shared across connections behind an
/// `Arc`. Credentials and the index collection are process-wide state,
/// injected here as explicit dependencies rather than globals.
pub struct AppState {
    pub config: Config,
    pub memory: MemoryStore,
    pub index: Box<dyn VectorIndex>,
    pub gateway: LlmGateway,
    pub baselines: Baselines,
    pub cost_tracker: CostTracker,
}

impl AppState {
    /// Build the process-wide state from configuration: ensure the memory
    /// directory and vector index exist, load LLM credentials if configured
    /// (degraded mode otherwise), and reindex from whatever is on disk.
    pub async fn build(config: Config) -> Result<Self> {
        let memory = MemoryStore::new(config.memory_dir.clone());
        memory.ensure_initialized()?;

        let index = FlatCosineIndex::new(config.vector_index_dir.clone())?;
        let files = memory.read_all()?;
        index.reindex(&files).await?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| crate::error::ImpulseError::other(format!("building HTTP client: {e}")))?;

        let credentials = match &config.llm_credentials_path {
            Some(path) => Some(CredentialSource::from_path(path, http)?),
            None => None,
        };

        let gateway = LlmGateway::new(
            config.llm_base_url.clone(),
            config.llm_model.clone(),
            credentials,
            std::time::Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            memory,
            index: Box::new(index),
            gateway,
            baselines: Baselines::default(),
            cost_tracker: CostTracker::new(),
            config,
        })
    }
}

/// Build the router; split out from [`run_server`] so tests can mount it
/// against an in-memory client without binding a socket.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::analyze))
        .route("/sync", post(handlers::sync))
        .route("/preferences", post(handlers::update_preferences))
        .route("/reset", post(handlers::reset))
        .route("/consolidate", post(handlers::consolidate))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve forever.
pub async fn run_server(config: Config) -> Result<()> {
    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::build(config).await?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "impulseguard server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::ImpulseError::other(format!("server error: {e}")))
}
