//! Route handlers for the purchase-analysis service.
//!
//! Only input-validation failures become non-2xx: reasoning and retrieval
//! failures degrade internally instead of surfacing as server errors, so
//! the purchase endpoint practically never 5xx's on a well-formed request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::memory::templates;
use crate::mutator::MemoryMutator;
use crate::orchestrator::Orchestrator;
use crate::telemetry::TelemetrySample;

use super::AppState;

/// Structured error body for validation failures and genuine operational
/// failures.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub(crate) enum ApiError {
    Validation(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<crate::error::ImpulseError> for ApiError {
    fn from(e: crate::error::ImpulseError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// `POST /analyze` — the primary endpoint.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<TelemetrySample>,
) -> Result<impl IntoResponse, ApiError> {
    if let Err(reason) = sample.validate() {
        return Err(ApiError::Validation(reason));
    }

    let orchestrator = Orchestrator::new(
        &state.config,
        state.baselines.clone(),
        &state.memory,
        state.index.as_ref(),
        &state.gateway,
    )
    .with_cost_tracker(&state.cost_tracker);
    let analysis = orchestrator.analyze_with_fallback(&sample).await;
    Ok(Json(analysis))
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    indexed_files: usize,
}

/// `POST /sync` — trigger a full re-index.
pub async fn sync(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let files = state.memory.read_all()?;
    let count = files.len();
    state.index.reindex(&files).await?;
    Ok(Json(SyncResponse { indexed_files: count }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub budget: f64,
    pub threshold: f64,
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub financial_goals: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

impl Sensitivity {
    fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        }
    }
}

#[derive(Debug, Serialize)]
struct PreferencesResponse {
    routed_goal_update: bool,
}

/// `POST /preferences` — rewrite `Budget.md` from a fixed template with the
/// submitted values, then optionally route free-text goals into whichever
/// file they belong in.
pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.budget < 0.0 {
        return Err(ApiError::Validation("budget must be >= 0".to_string()));
    }
    if req.threshold < 0.0 {
        return Err(ApiError::Validation("threshold must be >= 0".to_string()));
    }

    let content = format!(
        "# Budget\n\n\
         ## Monthly Limits\n\
         - ${:.2} per category: sensitivity {}\n\n\
         ## Category Budgets\n\
         - Alert threshold: ${:.2}\n\n\
         ## Last Updated\n\
         - never\n",
        req.budget,
        req.sensitivity.as_str(),
        req.threshold
    );
    state.memory.write_file("Budget.md", &content)?;
    state.index.upsert_file("Budget.md", &content).await?;

    let mut routed_goal_update = false;
    if let Some(goals) = req.financial_goals.as_deref().filter(|s| !s.trim().is_empty()) {
        let mutator = MemoryMutator::new(
            &state.memory,
            state.index.as_ref(),
            &state.gateway,
            state.config.refinement_threshold,
        );
        let outcome = mutator.apply(goals).await;
        routed_goal_update = matches!(outcome, crate::mutator::MutationOutcome::Applied { .. });
        tracing::info!(?outcome, "routed free-text financial goals");
    }

    Ok(Json(PreferencesResponse { routed_goal_update }))
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    files_reset: usize,
}

/// `POST /reset` — wipe everything under `memory_dir` that isn't one of the
/// four canonical files, purge the vector index's storage, rewrite the
/// four templates, and re-index.
pub async fn reset(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let memory_dir = &state.config.memory_dir;
    let vector_index_dir = &state.config.vector_index_dir;

    if let Ok(entries) = std::fs::read_dir(memory_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let is_canonical = templates::MEMORY_FILES
                .iter()
                .any(|f| name.to_str() == Some(f));
            if is_canonical || &path == vector_index_dir {
                continue;
            }
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    let _ = std::fs::remove_dir_all(vector_index_dir);
    std::fs::create_dir_all(vector_index_dir)
        .map_err(|e| ApiError::Internal(format!("recreating vector index dir: {e}")))?;

    for file_name in templates::MEMORY_FILES {
        let content = templates::default_content(file_name).unwrap_or_default();
        state.memory.write_file(file_name, content)?;
    }

    let files = state.memory.read_all()?;
    state.index.reindex(&files).await?;

    Ok(Json(ResetResponse {
        files_reset: templates::MEMORY_FILES.len(),
    }))
}

/// `POST /consolidate` — run the consolidation sweep.
pub async fn consolidate(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mutator = MemoryMutator::new(
        &state.memory,
        state.index.as_ref(),
        &state.gateway,
        state.config.refinement_threshold,
    );
    let results = mutator
        .consolidate(
            state.config.consolidation_size_threshold,
            state.config.consolidation_observation_threshold,
        )
        .await;
    Json(results)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    memory_indexed: bool,
    collection_count: usize,
    llm_available: bool,
    scorer_available: bool,
}

/// `GET /health`.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        memory_indexed: !state.index.is_empty(),
        collection_count: state.index.chunk_count(),
        llm_available: state.gateway.is_configured(),
        scorer_available: true,
    })
}
