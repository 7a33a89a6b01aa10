//! Personality quiz state machine.
//!
//! Every transition is persisted through the `SessionStore` before the resulting
//! step is handed back, so the caller only renders state that is already saved.
//! Transitions on one user key are serialized by a per-key async mutex.
//!
//! `submit_answer` is not idempotent: submitting the same answer twice counts
//! it twice. Duplicate webhook deliveries must be filtered before reaching here.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex as StdMutex},
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use crate::domain::{QuizBank, QuizQuestion, QuizSession};
use crate::error::QuizError;
use crate::result::{resolve, QuizResult};
use crate::store::SessionStore;

// Above this many idle entries the lock table is pruned.
const LOCK_TABLE_SOFT_LIMIT: usize = 1024;

/// What the caller should show next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuizStep {
  /// `index` is 0-based; `total` is the question count.
  Question { index: usize, total: usize, question: QuizQuestion },
  Finished(QuizResult),
}

#[derive(Default)]
struct KeyedLocks {
  inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
  async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = match self.inner.lock() {
        Ok(m) => m,
        Err(poisoned) => poisoned.into_inner(),
      };
      if map.len() > LOCK_TABLE_SOFT_LIMIT {
        map.retain(|_, l| Arc::strong_count(l) > 1);
      }
      map.entry(key.to_string()).or_default().clone()
    };
    lock.lock_owned().await
  }
}

pub struct QuizEngine {
  bank: Arc<QuizBank>,
  store: Arc<dyn SessionStore>,
  locks: KeyedLocks,
}

impl QuizEngine {
  pub fn new(bank: Arc<QuizBank>, store: Arc<dyn SessionStore>) -> Self {
    Self { bank, store, locks: KeyedLocks::default() }
  }

  pub fn question_count(&self) -> usize { self.bank.len() }

  /// Start (or restart) the quiz: any existing session is replaced by a fresh one at question 0.
  #[instrument(level = "info", skip(self))]
  pub async fn start(&self, user_key: &str) -> Result<QuizStep, QuizError> {
    let _guard = self.locks.acquire(user_key).await;
    self.start_locked(user_key).await
  }

  async fn start_locked(&self, user_key: &str) -> Result<QuizStep, QuizError> {
    if self.bank.is_empty() {
      return Err(QuizError::Configuration("question bank is empty".into()));
    }
    let session = QuizSession::new(user_key);
    self.store.put(&session).await?;
    info!(target: "quiz", %user_key, total = self.bank.len(), "Quiz started");
    self.question_step(&session)
  }

  /// Apply one answer to the current question and advance.
  #[instrument(level = "info", skip(self, raw_answer), fields(answer_len = raw_answer.len()))]
  pub async fn submit_answer(&self, user_key: &str, raw_answer: &str) -> Result<QuizStep, QuizError> {
    let _guard = self.locks.acquire(user_key).await;

    let mut session = self
      .store
      .get(user_key)
      .await?
      .ok_or_else(|| QuizError::NoActiveSession(user_key.to_string()))?;
    if session.is_completed {
      return Err(QuizError::QuizCompleted(user_key.to_string()));
    }

    let question = self.current_question_checked(&session).await?;
    let option_idx = question.resolve_option(raw_answer).ok_or_else(|| QuizError::InvalidAnswer {
      answer: raw_answer.trim().to_string(),
      question_no: session.current_q_no + 1,
    })?;
    let option = &question.options[option_idx];

    session.apply_answer(option, self.bank.len());
    self.store.put(&session).await?;
    info!(
      target: "quiz", %user_key, q_no = session.current_q_no, category = %option.category,
      weight = option.weight, completed = session.is_completed, "Answer applied"
    );

    if session.is_completed {
      return self.finish(&session).await.map(QuizStep::Finished);
    }
    self.question_step(&session)
  }

  /// Delete the session. Quitting without a session is fine.
  #[instrument(level = "info", skip(self))]
  pub async fn quit(&self, user_key: &str) -> Result<(), QuizError> {
    let _guard = self.locks.acquire(user_key).await;
    self.store.delete(user_key).await?;
    info!(target: "quiz", %user_key, "Quiz session removed");
    Ok(())
  }

  /// The question the user is currently on.
  #[instrument(level = "debug", skip(self))]
  pub async fn current_question(&self, user_key: &str) -> Result<QuizStep, QuizError> {
    let _guard = self.locks.acquire(user_key).await;
    let session = self
      .store
      .get(user_key)
      .await?
      .ok_or_else(|| QuizError::NoActiveSession(user_key.to_string()))?;
    if session.is_completed {
      return Err(QuizError::QuizCompleted(user_key.to_string()));
    }
    self.current_question_checked(&session).await?;
    self.question_step(&session)
  }

  /// Continue an in-progress quiz, or start a new one when there is none to continue.
  #[instrument(level = "info", skip(self))]
  pub async fn resume(&self, user_key: &str) -> Result<QuizStep, QuizError> {
    let _guard = self.locks.acquire(user_key).await;
    match self.store.get(user_key).await? {
      Some(session) if !session.is_completed => {
        self.current_question_checked(&session).await?;
        self.question_step(&session)
      }
      _ => self.start_locked(user_key).await,
    }
  }

  /// The session if it exists and is not completed.
  pub async fn active_session(&self, user_key: &str) -> Result<Option<QuizSession>, QuizError> {
    Ok(self.store.get(user_key).await?.filter(|s| !s.is_completed))
  }

  /// Look up `questions[current_q_no]`. An out-of-range index means the stored
  /// session is corrupt; it is reset before the error is returned.
  async fn current_question_checked(&self, session: &QuizSession) -> Result<&QuizQuestion, QuizError> {
    match self.bank.questions.get(session.current_q_no) {
      Some(q) => Ok(q),
      None => {
        warn!(
          target: "quiz", user_key = %session.user_key, q_no = session.current_q_no,
          total = self.bank.len(), "Session index out of range; resetting session"
        );
        self.store.delete(&session.user_key).await?;
        Err(QuizError::InternalState(format!(
          "question index {} out of range for {} questions",
          session.current_q_no,
          self.bank.len()
        )))
      }
    }
  }

  fn question_step(&self, session: &QuizSession) -> Result<QuizStep, QuizError> {
    let question = self.bank.questions.get(session.current_q_no).ok_or_else(|| {
      QuizError::InternalState(format!("question index {} out of range", session.current_q_no))
    })?;
    Ok(QuizStep::Question {
      index: session.current_q_no,
      total: self.bank.len(),
      question: question.clone(),
    })
  }

  /// Resolve the final result. If it cannot be resolved the quiz is aborted and the session removed.
  async fn finish(&self, session: &QuizSession) -> Result<QuizResult, QuizError> {
    let resolved = resolve(&session.scores, &self.bank.characters, &mut rand::thread_rng());
    match resolved {
      Ok(result) => {
        info!(target: "quiz", user_key = %session.user_key, category = %result.category, score = result.score, "Quiz completed");
        Ok(result)
      }
      Err(e) => {
        warn!(target: "quiz", user_key = %session.user_key, error = %e, "Result resolution failed; aborting quiz");
        self.store.delete(&session.user_key).await?;
        Err(e)
      }
    }
  }
}
