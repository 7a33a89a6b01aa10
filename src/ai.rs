//! Generative-AI backend selection.

use crate::error::AiError;
use crate::openai::OpenAI;
use crate::vertex::VertexAi;

#[derive(Clone)]
pub enum AiBackend {
  Vertex(VertexAi),
  OpenAi(OpenAI),
}

impl AiBackend {
  pub fn name(&self) -> &'static str {
    match self {
      AiBackend::Vertex(_) => "vertex",
      AiBackend::OpenAi(_) => "openai",
    }
  }

  pub fn model(&self) -> &str {
    match self {
      AiBackend::Vertex(v) => &v.model,
      AiBackend::OpenAi(o) => &o.model,
    }
  }

  pub async fn reply(&self, system: &str, prompt: &str) -> Result<String, AiError> {
    match self {
      AiBackend::Vertex(v) => v.generate(system, prompt, 0.4).await,
      AiBackend::OpenAi(o) => o.chat_plain(system, prompt, 0.4).await,
    }
  }
}

/// Local fallback used when no backend is configured.
pub fn reply_stub(text: &str) -> String {
  let lower = text.to_lowercase();
  if lower.contains("naruto") {
    "Naruto Uzumaki dreams of becoming Hokage, believe it!".into()
  } else if lower.contains("ask me a question") {
    "Here's one: what is the name of the nine-tailed fox sealed inside Naruto?".into()
  } else {
    "My chakra is low right now, so I can't answer that. Try the personality quiz instead!".into()
  }
}
