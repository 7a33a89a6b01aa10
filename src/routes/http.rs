//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, instrument, warn};

use crate::error::BotError;
use crate::logic::{handle_event, Outcome};
use crate::protocol::{HealthOut, WebhookAck, WebhookEnvelope, WebhookEvent};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_root() -> &'static str { "Welcome to Narubot!" }

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

/// Webex webhook receiver. Decodes the envelope here so the dispatcher only sees typed events.
#[instrument(level = "info", skip(state, body), fields(body_len = body.len()))]
pub async fn http_post_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
  let envelope = match serde_json::from_slice::<WebhookEnvelope>(&body) {
    Ok(env) => env,
    Err(e) => {
      warn!(target: "narubot", error = %e, "Rejected malformed webhook payload");
      return (StatusCode::BAD_REQUEST, Json(WebhookAck::failed("bad request", e.to_string())));
    }
  };
  let resource = format!(
    "{}.{}",
    envelope.resource.as_deref().unwrap_or("unknown"),
    envelope.event.as_deref().unwrap_or("unknown")
  );
  let event = WebhookEvent::from(envelope);

  match handle_event(&state, event).await {
    Ok(Outcome::Handled) => {
      info!(target: "narubot", %resource, "Webhook handled");
      (StatusCode::OK, Json(WebhookAck::received()))
    }
    Ok(Outcome::Ignored(reason)) => {
      info!(target: "narubot", %resource, %reason, "Webhook ignored");
      (StatusCode::OK, Json(WebhookAck::received()))
    }
    Err(e) => {
      let (status, label) = error_status(&e);
      error!(target: "narubot", %resource, error = %e, status = status.as_u16(), "Webhook failed");
      (status, Json(WebhookAck::failed(label, e.to_string())))
    }
  }
}

fn error_status(e: &BotError) -> (StatusCode, &'static str) {
  match e {
    BotError::BadPayload(_) => (StatusCode::BAD_REQUEST, "bad request"),
    BotError::Gateway(_) | BotError::Undelivered(_) => {
      (StatusCode::INTERNAL_SERVER_ERROR, "failed to reach messaging gateway")
    }
    BotError::Ai(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to generate AI response"),
    BotError::Quiz(_) | BotError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to process quiz"),
    BotError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to load config"),
  }
}
