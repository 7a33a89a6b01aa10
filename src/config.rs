//! Runtime settings (environment + optional secrets file) and the quiz/prompt
//! configuration file.
//!
//! Settings are resolved once in `main` and passed down explicitly.
//! Quiz content is read from TOML (or JSON when the path ends in `.json`):
//!
//! ```toml
//! [prompts]
//! chat_system = "..."
//!
//! [[questions]]
//! prompt = "Your team is in trouble. You..."
//! options = [
//!   { text = "charge in", category = "Naruto", weight = 2 },
//!   { text = "make a plan", category = "Shikamaru", weight = 2 },
//! ]
//!
//! [characters.Naruto]
//! description = "Loud, stubborn and never gives up."
//! image = "https://example.com/naruto.png"
//! ```

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{CharacterInfo, QuizBank, QuizQuestion};
use crate::error::{BotError, QuizError};

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_WEBEX_BASE_URL: &str = "https://webexapis.com/v1";
const DEFAULT_STORE_URL: &str = "sqlite://narubot.db?mode=rwc";
const DEFAULT_QUIZ_CONFIG_PATH: &str = "quiz_questions.toml";

#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  /// Events authored by this address are the bot's own echoes.
  pub bot_email: Option<String>,
  pub webex_access_token: String,
  pub webex_base_url: String,
  pub ai: AiSettings,
  pub session_store_url: String,
  pub quiz_config_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AiSettings {
  Vertex {
    project_id: String,
    region: String,
    model: String,
    access_token: String,
    base_url: Option<String>,
  },
  OpenAi {
    api_key: String,
    base_url: String,
    model: String,
  },
  Disabled,
}

impl Settings {
  /// Environment variables win over keys of the `BOT_SECRETS_PATH` JSON file.
  pub fn from_env() -> Result<Self, BotError> {
    let secrets = match std::env::var("BOT_SECRETS_PATH") {
      Ok(path) => load_secrets_file(Path::new(&path))?,
      Err(_) => HashMap::new(),
    };
    Self::from_lookup(|key| {
      std::env::var(key)
        .ok()
        .or_else(|| secrets.get(key).cloned())
    })
  }

  pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let port = match get("PORT") {
      Some(p) => p.parse::<u16>().map_err(|_| BotError::Config(format!("invalid PORT '{p}'")))?,
      None => DEFAULT_PORT,
    };
    let webex_access_token = get("WEBEX_ACCESS_TOKEN")
      .ok_or_else(|| BotError::Config("WEBEX_ACCESS_TOKEN is required".into()))?;

    Ok(Self {
      port,
      bot_email: get("BOT_EMAIL"),
      webex_access_token,
      webex_base_url: get("WEBEX_BASE_URL").unwrap_or_else(|| DEFAULT_WEBEX_BASE_URL.into()),
      ai: ai_settings(&get)?,
      session_store_url: get("SESSION_STORE_URL")
        .or_else(|| get("MONGO_URI"))
        .unwrap_or_else(|| DEFAULT_STORE_URL.into()),
      quiz_config_path: get("QUIZ_CONFIG_PATH")
        .unwrap_or_else(|| DEFAULT_QUIZ_CONFIG_PATH.into())
        .into(),
    })
  }
}

fn ai_settings<G>(get: &G) -> Result<AiSettings, BotError>
where
  G: Fn(&str) -> Option<String>,
{
  let vertex = || -> Option<AiSettings> {
    Some(AiSettings::Vertex {
      project_id: get("GOOGLE_PROJECT_ID")?,
      access_token: get("GENAI_ACCESS_TOKEN")?,
      region: get("GOOGLE_REGION").unwrap_or_else(|| "us-central1".into()),
      model: get("GOOGLE_MODEL_ID").unwrap_or_else(|| "gemini-1.5-flash".into()),
      base_url: get("VERTEX_BASE_URL"),
    })
  };
  let openai = || -> Option<AiSettings> {
    Some(AiSettings::OpenAi {
      api_key: get("OPENAI_API_KEY")?,
      base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".into()),
      model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
    })
  };

  match get("AI_BACKEND").map(|b| b.to_lowercase()).as_deref() {
    Some("vertex") => vertex().ok_or_else(|| {
      BotError::Config("AI_BACKEND=vertex needs GOOGLE_PROJECT_ID and GENAI_ACCESS_TOKEN".into())
    }),
    Some("openai") => openai().ok_or_else(|| BotError::Config("AI_BACKEND=openai needs OPENAI_API_KEY".into())),
    Some("none") => Ok(AiSettings::Disabled),
    Some(other) => Err(BotError::Config(format!("unknown AI_BACKEND '{other}'"))),
    None => Ok(vertex().or_else(openai).unwrap_or(AiSettings::Disabled)),
  }
}

fn load_secrets_file(path: &Path) -> Result<HashMap<String, String>, BotError> {
  let raw = std::fs::read_to_string(path)
    .map_err(|e| BotError::Config(format!("failed to read secrets file {}: {e}", path.display())))?;
  let map: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
    .map_err(|e| BotError::Config(format!("failed to parse secrets file {}: {e}", path.display())))?;
  info!(target: "narubot", path = %path.display(), keys = map.len(), "Loaded secrets file");
  Ok(map
    .into_iter()
    .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
    .collect())
}

/// LLM prompts. Defaults are tuned for the Naruto persona; override them under `[prompts]`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub chat_system: String,
  pub ask_question_system: String,
  pub ask_question_user: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      chat_system: "You are Narubot, a cheerful ninja from the Hidden Leaf Village. Answer questions about the Naruto series in 1-3 short sentences. Stay in character and end with 'dattabayo!' now and then.".into(),
      ask_question_system: "You are a Naruto trivia host. Output ONLY the question, no answer.".into(),
      ask_question_user: "Ask me a question".into(),
    }
  }
}

/// Quiz content and prompts as read from `QUIZ_CONFIG_PATH`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BotConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub questions: Vec<QuizQuestion>,
  #[serde(default)]
  pub characters: HashMap<String, CharacterInfo>,
}

impl BotConfig {
  /// Split into the validated question bank and the prompts.
  pub fn into_parts(self) -> Result<(QuizBank, Prompts), QuizError> {
    let bank = QuizBank::new(self.questions, self.characters);
    bank.validate()?;
    Ok((bank, self.prompts))
  }
}

pub fn load_bot_config(path: &Path) -> Result<BotConfig, QuizError> {
  let raw = std::fs::read_to_string(path)
    .map_err(|e| QuizError::Configuration(format!("failed to read {}: {e}", path.display())))?;
  let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
  let cfg = if is_json {
    serde_json::from_str::<BotConfig>(&raw).map_err(|e| e.to_string())
  } else {
    toml::from_str::<BotConfig>(&raw).map_err(|e| e.to_string())
  }
  .map_err(|e| QuizError::Configuration(format!("failed to parse {}: {e}", path.display())))?;

  info!(
    target: "narubot", path = %path.display(), questions = cfg.questions.len(),
    characters = cfg.characters.len(), "Loaded quiz config"
  );
  Ok(cfg)
}

/// Load bank + prompts, falling back to an empty bank (quiz unavailable) on any error.
/// Chat keeps working either way; `start` then reports the configuration error.
pub fn load_bank_and_prompts(path: &Path) -> (QuizBank, Prompts) {
  match load_bot_config(path) {
    Ok(cfg) => {
      let prompts = cfg.prompts.clone();
      match cfg.into_parts() {
        Ok(parts) => parts,
        Err(e) => {
          warn!(target: "narubot", path = %path.display(), error = %e, "Quiz bank invalid; quiz disabled");
          (QuizBank::default(), prompts)
        }
      }
    }
    Err(e) => {
      warn!(target: "narubot", path = %path.display(), error = %e, "Quiz config unavailable; quiz disabled");
      (QuizBank::default(), Prompts::default())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k: &str| map.get(k).cloned()
  }

  #[test]
  fn token_is_required() {
    assert!(matches!(Settings::from_lookup(lookup(&[])), Err(BotError::Config(_))));
  }

  #[test]
  fn defaults_apply() {
    let s = Settings::from_lookup(lookup(&[("WEBEX_ACCESS_TOKEN", "t")])).unwrap();
    assert_eq!(s.port, 8081);
    assert_eq!(s.webex_base_url, DEFAULT_WEBEX_BASE_URL);
    assert_eq!(s.session_store_url, DEFAULT_STORE_URL);
    assert_eq!(s.ai, AiSettings::Disabled);
    assert!(s.bot_email.is_none());
  }

  #[test]
  fn backend_is_inferred_from_credentials() {
    let s = Settings::from_lookup(lookup(&[
      ("WEBEX_ACCESS_TOKEN", "t"),
      ("OPENAI_API_KEY", "sk"),
      ("GOOGLE_PROJECT_ID", "proj"),
      ("GENAI_ACCESS_TOKEN", "ya29"),
    ]))
    .unwrap();
    assert!(matches!(s.ai, AiSettings::Vertex { ref project_id, .. } if project_id == "proj"));

    let s = Settings::from_lookup(lookup(&[("WEBEX_ACCESS_TOKEN", "t"), ("OPENAI_API_KEY", "sk")])).unwrap();
    assert!(matches!(s.ai, AiSettings::OpenAi { ref model, .. } if model == "gpt-4o-mini"));
  }

  #[test]
  fn explicit_backend_must_be_complete() {
    let res = Settings::from_lookup(lookup(&[("WEBEX_ACCESS_TOKEN", "t"), ("AI_BACKEND", "vertex")]));
    assert!(matches!(res, Err(BotError::Config(_))));
    let res = Settings::from_lookup(lookup(&[("WEBEX_ACCESS_TOKEN", "t"), ("AI_BACKEND", "llama")]));
    assert!(matches!(res, Err(BotError::Config(_))));
  }

  #[test]
  fn invalid_port_is_rejected() {
    let res = Settings::from_lookup(lookup(&[("WEBEX_ACCESS_TOKEN", "t"), ("PORT", "ninja")]));
    assert!(matches!(res, Err(BotError::Config(_))));
  }

  const SAMPLE_TOML: &str = r#"
[prompts]
chat_system = "custom"

[[questions]]
prompt = "Pick one"
options = [
  { text = "fight", category = "Naruto", weight = 2 },
  { text = "talk", category = "Sakura", weight = 2 },
]

[characters.Naruto]
description = "Never gives up."
image = "https://img/naruto.png"

[characters.Sakura]
description = "Brilliant and strong."
"#;

  #[test]
  fn loads_toml_config() {
    let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    f.write_all(SAMPLE_TOML.as_bytes()).unwrap();

    let (bank, prompts) = load_bot_config(f.path()).unwrap().into_parts().unwrap();
    assert_eq!(bank.len(), 1);
    assert_eq!(bank.questions[0].options[1].category, "Sakura");
    assert_eq!(bank.characters["Sakura"].image, None);
    assert_eq!(prompts.chat_system, "custom");
    assert_eq!(prompts.ask_question_user, Prompts::default().ask_question_user);
  }

  #[test]
  fn loads_json_config() {
    let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    f.write_all(
      br#"{"questions":[{"question":"Q","options":[{"text":"a","character":"Naruto","score":1}]}],
           "characters":{"Naruto":{"description":"d","image":"i"}}}"#,
    )
    .unwrap();
    let (bank, _) = load_bot_config(f.path()).unwrap().into_parts().unwrap();
    assert_eq!(bank.questions[0].prompt, "Q");
  }

  #[test]
  fn missing_file_disables_quiz() {
    let err = load_bot_config(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, QuizError::Configuration(_)));
    let (bank, _) = load_bank_and_prompts(Path::new("/definitely/not/here.toml"));
    assert!(bank.is_empty());
  }

  #[test]
  fn secrets_file_supplies_keys() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(br#"{"WEBEX_ACCESS_TOKEN":"from-file","BOT_EMAIL":"narubot@webex.bot","PORT":8080}"#)
      .unwrap();
    let secrets = load_secrets_file(f.path()).unwrap();
    assert_eq!(secrets.get("WEBEX_ACCESS_TOKEN").map(String::as_str), Some("from-file"));
    // non-string values are skipped
    assert!(!secrets.contains_key("PORT"));
  }
}
