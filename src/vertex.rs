//! Vertex AI generative model client (`:generateContent`).
//!
//! Authenticates with a pre-issued OAuth access token (`GENAI_ACCESS_TOKEN`).

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::AiError;

#[derive(Clone)]
pub struct VertexAi {
  client: reqwest::Client,
  access_token: String,
  pub endpoint: String,
  pub model: String,
}

impl VertexAi {
  /// `base_url` overrides the regional host, e.g. for a proxy.
  pub fn new(
    access_token: String,
    project_id: &str,
    region: &str,
    model: String,
    base_url: Option<String>,
  ) -> Result<Self, AiError> {
    if access_token.is_empty() || project_id.is_empty() {
      return Err(AiError::NotConfigured);
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;
    let base = base_url.unwrap_or_else(|| format!("https://{region}-aiplatform.googleapis.com"));
    let endpoint = format!(
      "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
      base.trim_end_matches('/'), project_id, region, model
    );
    Ok(Self { client, access_token, endpoint, model })
  }

  #[instrument(level = "info", skip(self, system, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  pub async fn generate(&self, system: &str, prompt: &str, temperature: f32) -> Result<String, AiError> {
    let req = GenerateRequest {
      contents: vec![Content { role: Some("user".into()), parts: vec![Part { text: prompt.into() }] }],
      system_instruction: Some(Content { role: None, parts: vec![Part { text: system.into() }] }),
      generation_config: GenerationConfig { temperature, max_output_tokens: 400 },
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&self.endpoint)
      .header(USER_AGENT, "narubot-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_google_error(&body).unwrap_or(body);
      return Err(AiError::Status { status, message });
    }

    let body: GenerateResponse = res.json().await?;
    let text: String = body.candidates.first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Vertex AI response received");

    let text = text.trim().to_string();
    if text.is_empty() { return Err(AiError::EmptyResponse); }
    Ok(text)
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<Content>,
  generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
  #[serde(default)]
  text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  temperature: f32,
  max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<Content>,
}

fn extract_google_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  const MODEL_PATH: &str =
    "/v1/projects/proj/locations/us-central1/publishers/google/models/gemini-1.5-flash:generateContent";

  fn client(server: &MockServer) -> VertexAi {
    VertexAi::new("tok".into(), "proj", "us-central1", "gemini-1.5-flash".into(), Some(server.uri())).unwrap()
  }

  #[tokio::test]
  async fn generate_joins_candidate_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path(MODEL_PATH))
      .and(header("authorization", "Bearer tok"))
      .and(body_partial_json(json!({ "contents": [{ "role": "user", "parts": [{ "text": "Who is Kakashi?" }] }] })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": "The Copy " }, { "text": "Ninja." }] } }]
      })))
      .mount(&server)
      .await;

    let reply = client(&server).generate("sys", "Who is Kakashi?", 0.4).await.unwrap();
    assert_eq!(reply, "The Copy Ninja.");
  }

  #[tokio::test]
  async fn empty_candidates_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path(MODEL_PATH))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
      .mount(&server)
      .await;

    assert!(matches!(client(&server).generate("s", "p", 0.4).await, Err(AiError::EmptyResponse)));
  }

  #[test]
  fn missing_credentials_are_rejected() {
    assert!(matches!(VertexAi::new(String::new(), "p", "r", "m".into(), None), Err(AiError::NotConfigured)));
    assert!(matches!(VertexAi::new("t".into(), "", "r", "m".into(), None), Err(AiError::NotConfigured)));
  }

  #[test]
  fn default_endpoint_is_regional() {
    let v = VertexAi::new("t".into(), "p", "europe-west4", "m".into(), None).unwrap();
    assert_eq!(
      v.endpoint,
      "https://europe-west4-aiplatform.googleapis.com/v1/projects/p/locations/europe-west4/publishers/google/models/m:generateContent"
    );
  }
}
