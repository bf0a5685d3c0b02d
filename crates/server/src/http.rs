//! HTTP surface: routes, handlers, and the error envelope.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::debug;

use domain::PredictionResult;

use crate::assets::AssetMount;
use crate::config::ServiceConfig;
use crate::error::PredictionError;
use crate::orchestrator::PredictionOrchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: PredictionOrchestrator,
    pub results: Arc<AssetMount>,
    pub crop_images: Arc<AssetMount>,
}

impl AppState {
    pub fn new(
        orchestrator: PredictionOrchestrator,
        results: AssetMount,
        crop_images: AssetMount,
    ) -> Self {
        Self {
            orchestrator,
            results: Arc::new(results),
            crop_images: Arc::new(crop_images),
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/results/*path", get(results))
        .route("/crop_images/*path", get(crop_images))
        .with_state(state)
}

/// Build the production router from configuration.
pub fn app_from_config(config: &ServiceConfig) -> Result<Router> {
    let orchestrator = PredictionOrchestrator::from_config(config)?;
    let state = AppState::new(
        orchestrator,
        AssetMount::new(config.server.results_dir.clone()),
        AssetMount::new(config.server.crop_images_dir.clone()),
    );
    Ok(router(state))
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResult>, PredictionError> {
    let Json(body) = body.map_err(|e| PredictionError::InvalidRequest(e.body_text()))?;
    let result = state.orchestrator.predict(body).await?;
    Ok(Json(result))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "enrichment": state.orchestrator.enrichment_enabled(),
        "predictor_capacity": state.orchestrator.predictor_capacity(),
    }))
}

async fn results(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    serve_asset(&state.results, &path).await
}

async fn crop_images(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    serve_asset(&state.crop_images, &path).await
}

async fn serve_asset(mount: &AssetMount, path: &str) -> Response {
    match mount.load(path).await {
        Some(asset) => ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response(),
        None => {
            debug!("asset {:?} not found under {:?}", path, mount.root());
            error_response(StatusCode::NOT_FOUND, "not_found", "no such file")
        }
    }
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "kind": kind,
            "message": message,
        }
    });
    (status, Json(body)).into_response()
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        error_response(kind.status(), kind.as_str(), &self.to_string())
    }
}
