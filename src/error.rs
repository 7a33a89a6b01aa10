//! Error taxonomy for the bot.
//!
//! `QuizError` covers the quiz core (state machine, resolver, bank loading).
//! The I/O collaborators (session store, Webex gateway, AI backends) each get
//! their own enum, and `BotError` is what the webhook dispatcher propagates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuizError {
  #[error("quiz configuration error: {0}")]
  Configuration(String),
  #[error("invalid answer '{answer}' for question {question_no}")]
  InvalidAnswer { answer: String, question_no: usize },
  #[error("internal quiz state error: {0}")]
  InternalState(String),
  #[error("no category scored above zero")]
  NoScore,
  #[error("no character info for category '{0}'")]
  UnknownCategory(String),
  #[error("no active quiz session for '{0}'")]
  NoActiveSession(String),
  #[error("quiz session for '{0}' is already completed")]
  QuizCompleted(String),
  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Sqlx error: {0}")]
  Sqlx(#[from] sqlx::Error),
  #[error("JSON serialization error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("unsupported session store url: {0}")]
  UnsupportedUrl(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("Webex request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("Webex HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("Webex response is missing '{0}'")]
  MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum AiError {
  #[error("AI request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("AI HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("AI response contained no text")]
  EmptyResponse,
  #[error("no AI backend configured")]
  NotConfigured,
}

#[derive(Debug, Error)]
pub enum BotError {
  #[error("configuration error: {0}")]
  Config(String),
  #[error("bad webhook payload: {0}")]
  BadPayload(String),
  #[error(transparent)]
  Quiz(#[from] QuizError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Gateway(#[from] GatewayError),
  /// The quiz transition was saved but its reply never reached the room.
  #[error("quiz state saved but reply not delivered: {0}")]
  Undelivered(GatewayError),
  #[error(transparent)]
  Ai(#[from] AiError),
}
