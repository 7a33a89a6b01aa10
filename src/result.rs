//! Final result resolution: highest score wins, ties broken uniformly at random.
//!
//! A score map where nothing scored above zero is reported as `NoScore`
//! instead of picking a random category out of nothing.

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::domain::CharacterInfo;
use crate::error::QuizError;

/// Resolved outcome of a completed quiz.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuizResult {
  pub category: String,
  pub description: String,
  pub image: Option<String>,
  pub score: u32,
}

impl QuizResult {
  pub fn message(&self) -> String {
    format!("You are most like {}! {}", self.category, self.description)
  }
}

/// Pick the winning category. Only categories sharing the maximum score are candidates.
pub fn resolve_category<R: Rng + ?Sized>(
  scores: &BTreeMap<String, u32>,
  rng: &mut R,
) -> Result<(String, u32), QuizError> {
  let max = scores.values().copied().max().unwrap_or(0);
  if max == 0 {
    return Err(QuizError::NoScore);
  }

  let tied: Vec<&String> = scores
    .iter()
    .filter(|(_, s)| **s == max)
    .map(|(c, _)| c)
    .collect();

  let winner = tied.choose(rng).ok_or(QuizError::NoScore)?;
  Ok(((*winner).clone(), max))
}

/// Resolve the category and attach its character description.
pub fn resolve<R: Rng + ?Sized>(
  scores: &BTreeMap<String, u32>,
  characters: &HashMap<String, CharacterInfo>,
  rng: &mut R,
) -> Result<QuizResult, QuizError> {
  let (category, score) = resolve_category(scores, rng)?;
  let info = characters
    .get(&category)
    .ok_or_else(|| QuizError::UnknownCategory(category.clone()))?;
  Ok(QuizResult {
    category,
    description: info.description.clone(),
    image: info.image.clone(),
    score,
  })
}
