//! The demo UI: one page with a textbox, one endpoint that feeds each
//! submission to [`DemoAdapter::handle_input`].

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::adapter::{DemoAdapter, predictions_to_text};
use crate::consts::SAMPLE_INPUT;
use crate::error::DemoError;

const INDEX_HTML: &str = include_str!("index.html");

pub struct AppState {
    pub adapter: Arc<DemoAdapter>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub task: Option<String>,
    pub url: Option<String>,
    pub checkpoint: Option<String>,
    pub sample_input: String,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub output: String,
    pub predictions: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: DemoError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let config = state.adapter.config();
    Json(ConfigResponse {
        task: config.as_ref().map(|c| c.task.clone()),
        url: config.as_ref().map(|c| c.url.clone()),
        checkpoint: config.map(|c| c.checkpoint),
        sample_input: SAMPLE_INPUT.to_string(),
    })
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    match state.adapter.handle_input(&request.text).await {
        Ok(predictions) => Ok(Json(PredictResponse {
            output: predictions_to_text(&predictions),
            predictions,
        })),
        Err(e) => {
            error!(error = %e, "prediction failed");
            Err(api_error(e))
        }
    }
}

pub fn router(adapter: Arc<DemoAdapter>) -> Router {
    let state = Arc::new(AppState { adapter });
    Router::new()
        .route("/", get(index))
        .route("/api/config", get(get_config))
        .route("/api/predict", post(predict))
        .with_state(state)
}

/// Bind `host` (a hostname or an IPv4/IPv6 literal) on `port`.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host} port {port}"))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(adapter: Arc<DemoAdapter>, host: &str, port: u16) -> Result<()> {
    let listener = bind(host, port).await?;
    serve_on(listener, adapter).await
}

/// Serve on an already bound listener until Ctrl+C.
pub async fn serve_on(listener: TcpListener, adapter: Arc<DemoAdapter>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Launching demo server at {}", addr);

    axum::serve(listener, router(adapter))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Demo server at {} stopped", addr);
    Ok(())
}
