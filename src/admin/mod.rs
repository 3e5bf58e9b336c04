//! Small HTTP control surface: inspect and override per-repository pinned
//! tag and auto-deploy policy, plus `/health` and `/metrics`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::WatcherError;
use crate::metrics;
use crate::store::Store;

#[derive(Clone)]
struct AdminState {
    store: Arc<dyn Store>,
}

pub async fn serve(listening_address: &str, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let state = AdminState { store };

    let app = Router::new()
        .route("/repositories", get(list_repositories))
        .route("/repositories/{repo}/pinned-tag", put(set_pinned_tag))
        .route("/repositories/{repo}/auto-deploy", put(set_auto_deploy))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("starting admin server on {}", listening_address);
    let listener = tokio::net::TcpListener::bind(listening_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct RepositoryView {
    repository: String,
    pinned_tag: String,
}

async fn list_repositories(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    let all = state.store.get_all().await?;
    let views: Vec<RepositoryView> = all
        .into_iter()
        .map(|(repository, pinned_tag)| RepositoryView { repository, pinned_tag })
        .collect();
    Ok(Json(views))
}

#[derive(Deserialize)]
struct PinnedTagBody {
    tag: String,
}

async fn set_pinned_tag(
    State(state): State<AdminState>,
    Path(repo): Path<String>,
    Json(body): Json<PinnedTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.set_pinned_tag(&repo, &body.tag).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AutoDeployBody {
    enabled: bool,
}

async fn set_auto_deploy(
    State(state): State<AdminState>,
    Path(repo): Path<String>,
    Json(body): Json<AutoDeployBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.set_auto_deploy(&repo, body.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {e}"))
                .into_response()
        }
    }
}

/// Maps domain errors to HTTP status codes at the admin boundary: row-not-
/// found is `404`, everything else is `400` with a human-readable body.
struct ApiError(WatcherError);

impl From<WatcherError> for ApiError {
    fn from(e: WatcherError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            WatcherError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
