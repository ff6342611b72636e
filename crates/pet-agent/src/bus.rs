use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pet_core::{ErrorBody, Event, EventName, EventReceived, StatusBody};
use serde_json::Value;
use std::{any::Any, io, sync::Arc};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error, info};

use crate::context::AgentContext;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("malformed body: {0}")]
    Body(#[from] serde_json::Error),
}

impl IntoResponse for BusError {
    fn into_response(self) -> Response {
        error!(event = "bus_internal_error", error = %self);
        internal_error()
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::internal())).into_response()
}

pub fn router(ctx: Arc<AgentContext>) -> Router {
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/event", post(ingest).fallback(not_found))
        .route("/shutdown", post(shutdown).fallback(not_found))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(ctx)
}

/// Serves until the shutdown channel flips to `true`.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<AgentContext>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn health() -> Json<StatusBody> {
    Json(StatusBody::ok())
}

async fn ingest(State(ctx): State<Arc<AgentContext>>, body: Bytes) -> Result<Response, BusError> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body)?
    };
    let name = payload.get("event").and_then(Value::as_str);
    let Some(name) = name.and_then(|name| name.parse::<EventName>().ok()) else {
        debug!(event = "event_rejected", payload = %payload);
        return Ok((StatusCode::BAD_REQUEST, Json(ErrorBody::invalid_event())).into_response());
    };

    let received = Event::now(name);
    let forwarded = ctx.forward(received.name);
    debug!(
        event = "event_received",
        name = %received.name,
        at = %received.timestamp.to_rfc3339(),
        forwarded
    );
    Ok(Json(EventReceived {
        received: received.name.as_str().to_string(),
    })
    .into_response())
}

async fn shutdown(State(ctx): State<Arc<AgentContext>>) -> Json<StatusBody> {
    info!(event = "shutdown_requested");
    ctx.request_shutdown();
    Json(StatusBody::shutting_down())
}

async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::NOT_FOUND, Json(ErrorBody::not_found()))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(event = "bus_handler_panic", detail = %detail);
    internal_error()
}
