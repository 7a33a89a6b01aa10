//! Webhook dispatch: classify a decoded event and run one of the three flows.
//!
//! This includes:
//!   - AI chat for free-form text
//!   - the greeting card
//!   - the personality quiz (start / answer / continue / quit)
//!
//! Quiz state is always persisted by the engine before anything is sent back.
//! Quiz errors the user can recover from are answered in the room and reported as handled.

use tracing::{debug, error, info, instrument, warn};

use crate::ai::reply_stub;
use crate::cards::{
  greeting_card, question_card, question_markdown, result_card, resume_prompt_card, GREETING_TEXT,
  RESUME_PROMPT_TEXT,
};
use crate::error::{BotError, GatewayError, QuizError};
use crate::protocol::{CardCommand, WebhookEvent};
use crate::quiz::QuizStep;
use crate::state::AppState;

const MSG_RETRIEVE_FAILED: &str = "I'm sorry, I couldn't retrieve the message.";
const MSG_AI_FAILED: &str = "I'm sorry, I couldn't generate a response.";
const MSG_QUIZ_UNAVAILABLE: &str = "I couldn't start the quiz. Please try again.";
const MSG_QUIZ_FAILED: &str = "I couldn't proceed with the quiz. Please try again.";
const MSG_INVALID_ANSWER: &str = "That's not one of the options. Pick one of the choices below (or reply with its number).";
const MSG_NO_QUIZ: &str = "You don't have a quiz running. Say 'quiz' to start one!";
const MSG_QUIZ_DONE: &str = "You've already finished the quiz! Say 'quiz' to take it again.";
const MSG_QUIZ_RESET: &str = "Something went wrong with your quiz session, so I reset it. Say 'quiz' to start again.";
const MSG_NO_RESULT: &str = "I couldn't work out your result this time. Say 'quiz' to try again.";
const MSG_QUIZ_QUIT: &str = "Quiz stopped. Say 'quiz' anytime to play again, dattabayo!";

/// How a delivery was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Handled,
  Ignored(&'static str),
}

/// What a plain chat message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextIntent {
  Greeting,
  StartQuiz,
  QuitQuiz,
  ContinueQuiz,
  Other,
}

pub fn classify_text(text: &str) -> TextIntent {
  let norm = text
    .trim()
    .trim_end_matches(|c: char| matches!(c, '!' | '?' | '.'))
    .to_lowercase();
  match norm.as_str() {
    "hi" | "hello" | "hey" | "help" | "menu" => TextIntent::Greeting,
    "quiz" | "start quiz" | "personality quiz" | "restart" | "restart quiz" => TextIntent::StartQuiz,
    "quit" | "stop" | "exit" | "quit quiz" => TextIntent::QuitQuiz,
    "continue" | "resume" | "continue quiz" => TextIntent::ContinueQuiz,
    _ => TextIntent::Other,
  }
}

/// Entry point for a decoded webhook event.
#[instrument(level = "info", skip(state, event), fields(room_id = %event.room_id(), delivery_id = %event.delivery_id()))]
pub async fn handle_event(state: &AppState, event: WebhookEvent) -> Result<Outcome, BotError> {
  if state.is_own_event(event.person_email()) {
    debug!(target: "narubot", "Ignoring event authored by the bot");
    return Ok(Outcome::Ignored("own message"));
  }
  let delivery_id = event.delivery_id().to_string();
  if !state.recent.first_sighting(&delivery_id).await {
    info!(target: "narubot", %delivery_id, "Duplicate delivery dropped");
    return Ok(Outcome::Ignored("duplicate delivery"));
  }

  let res = match event {
    WebhookEvent::Message { message_id, room_id, .. } => handle_message(state, &room_id, &message_id).await,
    WebhookEvent::CardSubmission { action_id, room_id, inputs, .. } => {
      handle_card(state, &room_id, &action_id, inputs).await
    }
  };

  match &res {
    // State already moved on; a redelivery must not apply the transition twice.
    Err(BotError::Undelivered(e)) => {
      warn!(target: "narubot", %delivery_id, error = %e, "Quiz state saved but reply failed; delivery stays marked");
    }
    Err(_) => state.recent.forget(&delivery_id).await,
    Ok(_) => {}
  }
  res.map(|_| Outcome::Handled)
}

async fn handle_message(state: &AppState, room_id: &str, message_id: &str) -> Result<(), BotError> {
  let text = match state.gateway.fetch_message_text(message_id).await {
    Ok(t) => t,
    Err(e) => {
      error!(target: "narubot", %message_id, error = %e, "Failed to fetch message text");
      notify(state, room_id, MSG_RETRIEVE_FAILED).await;
      return Err(e.into());
    }
  };

  let intent = classify_text(&text);
  debug!(target: "narubot", ?intent, text_len = text.len(), "Message classified");
  match intent {
    TextIntent::Greeting => send_greeting(state, room_id).await,
    TextIntent::StartQuiz => {
      let step = state.quiz.start(room_id).await;
      deliver_quiz(state, room_id, step, MSG_QUIZ_UNAVAILABLE).await
    }
    TextIntent::ContinueQuiz => {
      let step = state.quiz.resume(room_id).await;
      deliver_quiz(state, room_id, step, MSG_QUIZ_FAILED).await
    }
    TextIntent::QuitQuiz => quit_quiz(state, room_id).await,
    TextIntent::Other => {
      let in_quiz = match state.quiz.active_session(room_id).await {
        Ok(s) => s.is_some(),
        Err(e) => {
          notify(state, room_id, MSG_QUIZ_FAILED).await;
          return Err(e.into());
        }
      };
      if in_quiz {
        let step = state.quiz.submit_answer(room_id, &text).await;
        deliver_quiz(state, room_id, step, MSG_QUIZ_FAILED).await
      } else {
        chat(state, room_id, &state.prompts.chat_system, &text).await
      }
    }
  }
}

async fn handle_card(
  state: &AppState,
  room_id: &str,
  action_id: &str,
  inputs: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<(), BotError> {
  let inputs = match inputs {
    Some(i) => i,
    None => state.gateway.fetch_card_inputs(action_id).await?,
  };
  let cmd = CardCommand::from_inputs(&inputs)
    .ok_or_else(|| BotError::BadPayload("invalid card action".into()))?;
  info!(target: "narubot", ?cmd, "Card action received");

  match cmd {
    CardCommand::AskQuestion => {
      let (system, prompt) = (&state.prompts.ask_question_system, &state.prompts.ask_question_user);
      chat(state, room_id, system, prompt).await
    }
    CardCommand::StartQuiz | CardCommand::RestartQuiz => {
      let step = state.quiz.start(room_id).await;
      deliver_quiz(state, room_id, step, MSG_QUIZ_UNAVAILABLE).await
    }
    CardCommand::ContinueQuiz => {
      let step = state.quiz.resume(room_id).await;
      deliver_quiz(state, room_id, step, MSG_QUIZ_FAILED).await
    }
    CardCommand::QuitQuiz => quit_quiz(state, room_id).await,
    CardCommand::QuizAnswer(answer) => {
      let step = state.quiz.submit_answer(room_id, &answer).await;
      deliver_quiz(state, room_id, step, MSG_QUIZ_FAILED).await
    }
  }
}

/// Greeting card, or the continue/restart prompt when a quiz is still in progress.
async fn send_greeting(state: &AppState, room_id: &str) -> Result<(), BotError> {
  let active = match state.quiz.active_session(room_id).await {
    Ok(s) => s,
    Err(e) => {
      warn!(target: "quiz", %room_id, error = %e, "Could not check for an incomplete quiz");
      None
    }
  };
  match active {
    Some(session) => {
      let card = resume_prompt_card(session.current_q_no, state.quiz.question_count());
      state.gateway.send_card(room_id, RESUME_PROMPT_TEXT, &card).await?;
    }
    None => state.gateway.send_card(room_id, GREETING_TEXT, &greeting_card()).await?,
  }
  Ok(())
}

async fn quit_quiz(state: &AppState, room_id: &str) -> Result<(), BotError> {
  if let Err(e) = state.quiz.quit(room_id).await {
    notify(state, room_id, MSG_QUIZ_FAILED).await;
    return Err(e.into());
  }
  state.gateway.send_text(room_id, MSG_QUIZ_QUIT).await?;
  Ok(())
}

/// Render a quiz step, or turn a quiz error into the matching user message.
/// `failure_text` is sent for errors the user cannot fix (store, configuration).
async fn deliver_quiz(
  state: &AppState,
  room_id: &str,
  step: Result<QuizStep, QuizError>,
  failure_text: &str,
) -> Result<(), BotError> {
  match step {
    Ok(step) => send_step(state, room_id, &step).await.map_err(BotError::Undelivered),
    Err(QuizError::InvalidAnswer { answer, question_no }) => {
      debug!(target: "quiz", %answer, question_no, "Invalid answer; re-prompting");
      state.gateway.send_text(room_id, MSG_INVALID_ANSWER).await?;
      match state.quiz.current_question(room_id).await {
        Ok(step) => Ok(send_step(state, room_id, &step).await?),
        Err(e) => {
          error!(target: "quiz", %room_id, error = %e, "Could not re-read current question");
          state.gateway.send_text(room_id, MSG_QUIZ_RESET).await?;
          Ok(())
        }
      }
    }
    Err(QuizError::NoActiveSession(_)) => {
      state.gateway.send_text(room_id, MSG_NO_QUIZ).await?;
      Ok(())
    }
    Err(QuizError::QuizCompleted(_)) => {
      state.gateway.send_text(room_id, MSG_QUIZ_DONE).await?;
      Ok(())
    }
    Err(e @ QuizError::InternalState(_)) => {
      error!(target: "quiz", %room_id, error = %e, "Quiz session was corrupt and has been reset");
      state.gateway.send_text(room_id, MSG_QUIZ_RESET).await?;
      Ok(())
    }
    Err(e @ (QuizError::NoScore | QuizError::UnknownCategory(_))) => {
      error!(target: "quiz", %room_id, error = %e, "Quiz result could not be resolved; quiz aborted");
      state.gateway.send_text(room_id, MSG_NO_RESULT).await?;
      Ok(())
    }
    Err(e @ (QuizError::Configuration(_) | QuizError::Store(_))) => {
      error!(target: "quiz", %room_id, error = %e, "Quiz operation failed");
      notify(state, room_id, failure_text).await;
      Err(e.into())
    }
  }
}

async fn send_step(state: &AppState, room_id: &str, step: &QuizStep) -> Result<(), GatewayError> {
  match step {
    QuizStep::Question { index, total, question } => {
      let markdown = question_markdown(*index, *total, question);
      state.gateway.send_card(room_id, &markdown, &question_card(*index, *total, question)).await?;
    }
    QuizStep::Finished(result) => {
      state.gateway.send_card(room_id, &result.message(), &result_card(result)).await?;
    }
  }
  Ok(())
}

/// Ask the AI backend (or the local stub) and post the reply.
async fn chat(state: &AppState, room_id: &str, system: &str, prompt: &str) -> Result<(), BotError> {
  let reply = match &state.ai {
    Some(ai) => match ai.reply(system, prompt).await {
      Ok(t) => t,
      Err(e) => {
        error!(target: "narubot", backend = ai.name(), error = %e, "AI reply failed");
        notify(state, room_id, MSG_AI_FAILED).await;
        return Err(e.into());
      }
    },
    None => {
      debug!(target: "narubot", "AI reply via stub.");
      reply_stub(prompt)
    }
  };
  state.gateway.send_text(room_id, &reply).await?;
  Ok(())
}

/// Best-effort message; a failure here is only logged.
async fn notify(state: &AppState, room_id: &str, text: &str) {
  if let Err(e) = state.gateway.send_text(room_id, text).await {
    warn!(target: "narubot", %room_id, error = %e, "Failed to send failure notice");
  }
}
