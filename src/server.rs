use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::{self, SessionGateway};
use crate::guard::{self, AccessGuard};
use crate::logging::{LogLevel, RequestLogger, SharedLogger};
use crate::translate::claude_types::{CompletionRequest, ResetResponse};
use crate::translate::openai_types::ChatCompletionRequest;
use crate::translate::request::{normalize_chat, normalize_completion};
use crate::translate::response::{chat_completion_response, completion_response, reset_response};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: GatewayConfig,
    pub gateway: SessionGateway,
    pub guard: AccessGuard,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/complete", post(handle_complete))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/claude/reset", post(handle_reset))
        .route_layer(middleware::from_fn_with_state(
            state.guard.clone(),
            guard::require_token,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Decode a JSON body, reporting schema mismatches as 422.
fn parse_body<T: DeserializeOwned>(body: &Bytes, log: &RequestLogger) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        log.warn("server", format!("Rejected request body: {e}"));
        GatewayError::validation(e.to_string())
    })
}

fn request_logger(state: &AppState) -> RequestLogger {
    state.logger.request(uuid::Uuid::new_v4().to_string())
}

async fn handle_complete(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response> {
    let log = request_logger(&state);
    let req: CompletionRequest = parse_body(&body, &log)?;
    let streaming = req.is_streaming();
    let prompt = normalize_completion(&req.prompt);

    log.log_with_context(
        LogLevel::Info,
        "server",
        "POST /v1/complete",
        serde_json::json!({ "stream": streaming, "prompt_chars": prompt.chars().count() }),
    );

    let pending = state.gateway.send(&prompt).await.map_err(|e| {
        log.error("gateway", format!("Send failed: {e}"));
        e
    })?;

    if !streaming {
        let reply = pending.full_reply().await.map_err(|e| {
            log.error("gateway", format!("Reply failed: {e}"));
            e
        })?;
        log.info("server", format!("Completed: reply_chars={}", reply.chars().count()));
        return Ok(Json(completion_response(reply)).into_response());
    }

    let events = gateway::completion_sse_stream(pending.fragments(), log).map(
        |event| -> std::result::Result<Event, Infallible> {
            Ok(Event::default().event(event.event).data(event.data))
        },
    );

    Ok(Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(state.config.keep_alive_secs))
                .text("ping"),
        )
        .into_response())
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response> {
    let log = request_logger(&state);
    let req: ChatCompletionRequest = parse_body(&body, &log)?;
    let streaming = req.is_streaming();
    let prompt = normalize_chat(&req.messages);

    log.log_with_context(
        LogLevel::Info,
        "server",
        "POST /v1/chat/completions",
        serde_json::json!({
            "model": req.model,
            "stream": streaming,
            "messages": req.messages.len(),
            "prompt_chars": prompt.chars().count(),
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "top_p": req.top_p(),
            "frequency_penalty": req.frequency_penalty(),
            "presence_penalty": req.presence_penalty(),
        }),
    );

    let pending = state.gateway.send(&prompt).await.map_err(|e| {
        log.error("gateway", format!("Send failed: {e}"));
        e
    })?;

    if !streaming {
        let reply = pending.full_reply().await.map_err(|e| {
            log.error("gateway", format!("Reply failed: {e}"));
            e
        })?;
        log.info("server", format!("Completed: reply_chars={}", reply.chars().count()));
        return Ok(Json(chat_completion_response(reply)).into_response());
    }

    let lines = gateway::chat_sse_stream(pending.fragments(), log)
        .map(|line| Ok::<_, Infallible>(Bytes::from(line)));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(lines))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

async fn handle_reset(State(state): State<Arc<AppState>>) -> Result<Json<ResetResponse>> {
    let log = request_logger(&state);
    log.info("server", "POST /claude/reset");

    let pending = state
        .gateway
        .send(&state.config.reset_prompt)
        .await
        .map_err(|e| {
            log.error("gateway", format!("Send failed: {e}"));
            e
        })?;

    let reply = pending.full_reply().await.map_err(|e| {
        log.error("gateway", format!("Reset failed: {e}"));
        e
    })?;

    Ok(Json(reset_response(reply)))
}
