use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;
use vision::AnalysisRequest;

use crate::error::AnalysisError;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};
use crate::pipeline::Analyzer;

pub const MODEL_HEADER: &str = "x-model";
pub const LATENCY_HEADER: &str = "x-latency-ms";
pub const FINGERPRINT_HEADER: &str = "x-prompt-fingerprint";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct AppState {
    pub analyzer: Analyzer,
}

impl AppState {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer }
    }

    pub fn metrics(&self) -> &Metrics {
        self.analyzer.metrics()
    }
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    skus: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/analyze", post(analyze))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API running",
    })
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        skus: state.analyzer.catalog().len(),
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics().snapshot())
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let timer = TimedOperation::start();

    let result = match body {
        Ok(Json(request)) => {
            let span = tracing::info_span!("analyze", %request_id, sku = %request.sku);
            state.analyzer.analyze(&request).instrument(span).await
        }
        Err(rejection) => Err(AnalysisError::Validation(rejection.body_text())),
    };
    state
        .metrics()
        .record_request(timer.elapsed(), result.as_ref().map(|_| ()));

    let mut response = match result {
        Ok(analysis) => {
            let latency_ms = analysis.latency.as_millis() as u64;
            tracing::info!(%request_id, model = %analysis.model, latency_ms, "Analysis complete");

            let mut response = Json(analysis.response).into_response();
            let headers = response.headers_mut();
            headers.insert(HeaderName::from_static(LATENCY_HEADER), HeaderValue::from(latency_ms));
            if let Ok(value) = HeaderValue::from_str(&analysis.model) {
                headers.insert(HeaderName::from_static(MODEL_HEADER), value);
            }
            if let Ok(value) = HeaderValue::from_str(&analysis.fingerprint) {
                headers.insert(HeaderName::from_static(FINGERPRINT_HEADER), value);
            }
            response
        }
        Err(e) => {
            tracing::warn!(%request_id, kind = e.code(), error = %e, "Analysis failed");
            e.into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
