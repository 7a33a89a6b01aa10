//! Webex messaging gateway.
//!
//! The dispatcher only needs four capabilities: send text, send a card, fetch the
//! text of an incoming message, and fetch the inputs of a card submission.
//! `WebexClient` implements them over the Webex REST API.
//!
//! NOTE: the access token is never logged; message bodies are logged by length only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::cards::{AdaptiveCard, ADAPTIVE_CARD_CONTENT_TYPE};
use crate::error::GatewayError;

#[async_trait]
pub trait MessagingGateway: Send + Sync {
  async fn send_text(&self, room_id: &str, text: &str) -> Result<(), GatewayError>;
  /// `markdown` is shown by clients that cannot render the card.
  async fn send_card(&self, room_id: &str, markdown: &str, card: &AdaptiveCard) -> Result<(), GatewayError>;
  async fn fetch_message_text(&self, message_id: &str) -> Result<String, GatewayError>;
  async fn fetch_card_inputs(&self, action_id: &str) -> Result<Map<String, Value>, GatewayError>;
}

#[derive(Clone)]
pub struct WebexClient {
  client: reqwest::Client,
  access_token: String,
  pub base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextMessageReq<'a> {
  room_id: &'a str,
  text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CardMessageReq<'a> {
  room_id: &'a str,
  markdown: &'a str,
  attachments: Vec<AttachmentReq<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentReq<'a> {
  content_type: &'static str,
  content: &'a AdaptiveCard,
}

#[derive(Deserialize)]
struct MessageResp {
  #[serde(default)]
  text: Option<String>,
}

#[derive(Deserialize)]
struct AttachmentActionResp {
  #[serde(default)]
  inputs: Option<Map<String, Value>>,
}

impl WebexClient {
  pub fn new(access_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()?;
    Ok(Self {
      client,
      access_token: access_token.into(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }

  async fn post_message<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), GatewayError> {
    let url = format!("{}/messages", self.base_url);
    let res = self.client.post(&url)
      .header(USER_AGENT, "narubot-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
      .json(body).send().await?;
    check_status(res).await.map(|_| ())
  }

  async fn get_json<T: for<'a> Deserialize<'a>>(&self, url: &str) -> Result<T, GatewayError> {
    let res = self.client.get(url)
      .header(USER_AGENT, "narubot-backend/0.1")
      .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
      .send().await?;
    let res = check_status(res).await?;
    Ok(res.json::<T>().await?)
  }
}

#[async_trait]
impl MessagingGateway for WebexClient {
  #[instrument(level = "info", skip(self, text), fields(%room_id, text_len = text.len()))]
  async fn send_text(&self, room_id: &str, text: &str) -> Result<(), GatewayError> {
    self.post_message(&TextMessageReq { room_id, text }).await?;
    debug!(target: "narubot", "Text message sent");
    Ok(())
  }

  #[instrument(level = "info", skip(self, markdown, card), fields(%room_id, actions = card.actions.len()))]
  async fn send_card(&self, room_id: &str, markdown: &str, card: &AdaptiveCard) -> Result<(), GatewayError> {
    let body = CardMessageReq {
      room_id,
      markdown,
      attachments: vec![AttachmentReq { content_type: ADAPTIVE_CARD_CONTENT_TYPE, content: card }],
    };
    self.post_message(&body).await?;
    debug!(target: "narubot", "Card message sent");
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  async fn fetch_message_text(&self, message_id: &str) -> Result<String, GatewayError> {
    let url = format!("{}/messages/{}", self.base_url, message_id);
    let msg: MessageResp = self.get_json(&url).await?;
    msg.text.ok_or(GatewayError::MissingField("text"))
  }

  #[instrument(level = "info", skip(self))]
  async fn fetch_card_inputs(&self, action_id: &str) -> Result<Map<String, Value>, GatewayError> {
    let url = format!("{}/attachment/actions/{}", self.base_url, action_id);
    let action: AttachmentActionResp = self.get_json(&url).await?;
    action.inputs.ok_or(GatewayError::MissingField("inputs"))
  }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  let message = extract_webex_error(&body).unwrap_or(body);
  Err(GatewayError::Status { status, message })
}

/// Webex errors look like `{"message": "...", "trackingId": "..."}`.
fn extract_webex_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EObj>(body).ok().map(|e| e.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cards::greeting_card;
  use serde_json::json;
  use wiremock::matchers::{body_partial_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn client(server: &MockServer) -> WebexClient {
    WebexClient::new("test-token", server.uri()).unwrap()
  }

  #[tokio::test]
  async fn send_text_posts_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/messages"))
      .and(header("authorization", "Bearer test-token"))
      .and(body_partial_json(json!({ "roomId": "room-1", "text": "hello" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
      .expect(1)
      .mount(&server)
      .await;

    client(&server).await.send_text("room-1", "hello").await.unwrap();
  }

  #[tokio::test]
  async fn send_card_wraps_attachment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/messages"))
      .and(body_partial_json(json!({
        "roomId": "room-1",
        "markdown": "menu",
        "attachments": [{ "contentType": ADAPTIVE_CARD_CONTENT_TYPE, "content": { "type": "AdaptiveCard" } }]
      })))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;

    client(&server).await.send_card("room-1", "menu", &greeting_card()).await.unwrap();
  }

  #[tokio::test]
  async fn error_status_carries_webex_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/messages"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Room not found", "trackingId": "t" })))
      .mount(&server)
      .await;

    let err = client(&server).await.send_text("nope", "hi").await.unwrap_err();
    match err {
      GatewayError::Status { status, message } => {
        assert_eq!(status, 404);
        assert_eq!(message, "Room not found");
      }
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[tokio::test]
  async fn fetches_message_text_and_card_inputs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/messages/msg-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-1", "text": "hi there" })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/messages/msg-2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-2", "files": [] })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/attachment/actions/act-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "act-1", "inputs": { "action": "StartQuiz" } })))
      .mount(&server)
      .await;

    let c = client(&server).await;
    assert_eq!(c.fetch_message_text("msg-1").await.unwrap(), "hi there");
    assert!(matches!(c.fetch_message_text("msg-2").await, Err(GatewayError::MissingField("text"))));
    let inputs = c.fetch_card_inputs("act-1").await.unwrap();
    assert_eq!(inputs.get("action"), Some(&json!("StartQuiz")));
  }
}
