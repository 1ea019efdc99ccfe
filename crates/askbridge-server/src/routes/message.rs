//! One-shot messages — `POST /api/message`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/message", post(send_message))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Value>,
) -> impl IntoResponse {
    match state.broker.send_message(message).await {
        Ok(response) => (StatusCode::OK, Json(json!({ "response": response }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}
