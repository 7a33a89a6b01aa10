//! Domain models: quiz questions, character info, the question bank and the per-room quiz session.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QuizError;

/// One selectable answer. Picking it adds `weight` to `category`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
  pub text: String,
  #[serde(alias = "character")]
  pub category: String,
  #[serde(alias = "score", default = "default_weight")]
  pub weight: u32,
}

fn default_weight() -> u32 { 1 }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
  #[serde(alias = "question")]
  pub prompt: String,
  pub options: Vec<QuizOption>,
}

impl QuizQuestion {
  /// Resolve raw user input to an option index.
  /// Accepts a 1-based index ("2") or the option text (trimmed, case-insensitive).
  pub fn resolve_option(&self, raw: &str) -> Option<usize> {
    let input = raw.trim();
    if input.is_empty() { return None; }

    if let Ok(n) = input.parse::<usize>() {
      if (1..=self.options.len()).contains(&n) {
        return Some(n - 1);
      }
    }

    let mut matches = self
      .options
      .iter()
      .enumerate()
      .filter(|(_, o)| o.text.trim().eq_ignore_ascii_case(input));
    match (matches.next(), matches.next()) {
      (Some((i, _)), None) => Some(i),
      _ => None,
    }
  }
}

/// Result metadata for a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterInfo {
  pub description: String,
  #[serde(default)]
  pub image: Option<String>,
}

/// Static quiz content: ordered questions plus the character table.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QuizBank {
  #[serde(default)]
  pub questions: Vec<QuizQuestion>,
  #[serde(default)]
  pub characters: HashMap<String, CharacterInfo>,
}

impl QuizBank {
  pub fn new(questions: Vec<QuizQuestion>, characters: HashMap<String, CharacterInfo>) -> Self {
    Self { questions, characters }
  }

  pub fn len(&self) -> usize { self.questions.len() }

  pub fn is_empty(&self) -> bool { self.questions.is_empty() }

  /// Structural checks run once at load time.
  pub fn validate(&self) -> Result<(), QuizError> {
    if self.questions.is_empty() {
      return Err(QuizError::Configuration("question bank is empty".into()));
    }
    for (i, q) in self.questions.iter().enumerate() {
      if q.options.is_empty() {
        return Err(QuizError::Configuration(format!("question {} has no options", i + 1)));
      }
      for o in &q.options {
        if !self.characters.contains_key(&o.category) {
          return Err(QuizError::Configuration(format!(
            "question {} option '{}' targets unknown category '{}'",
            i + 1, o.text, o.category
          )));
        }
      }
    }
    Ok(())
  }
}

/// Per-room quiz progress. Exactly one exists per `user_key`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSession {
  pub user_key: String,
  pub current_q_no: usize,
  #[serde(default)]
  pub scores: BTreeMap<String, u32>,
  #[serde(default)]
  pub is_completed: bool,
  pub last_updated: DateTime<Utc>,
}

impl QuizSession {
  pub fn new(user_key: impl Into<String>) -> Self {
    Self {
      user_key: user_key.into(),
      current_q_no: 0,
      scores: BTreeMap::new(),
      is_completed: false,
      last_updated: Utc::now(),
    }
  }

  /// Absent categories score 0.
  pub fn score_of(&self, category: &str) -> u32 {
    self.scores.get(category).copied().unwrap_or(0)
  }

  /// The single scoring rule: add the option's weight to its category, advance by one,
  /// and mark completed once every question has been answered.
  pub fn apply_answer(&mut self, option: &QuizOption, question_count: usize) {
    let score = self.scores.entry(option.category.clone()).or_insert(0);
    *score = score.saturating_add(option.weight);
    self.current_q_no += 1;
    if self.current_q_no >= question_count {
      self.is_completed = true;
    }
    self.last_updated = Utc::now();
  }
}
