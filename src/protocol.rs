//! Webhook payloads and HTTP DTOs (serde ready).
//!
//! Webex deliveries are decoded here into `WebhookEvent`, so nothing past this
//! module ever looks at untyped JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw Webex webhook envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    pub data: WebhookData,
    /// Older bot builds posted card submissions with this extra block.
    #[serde(default)]
    pub attachment_actions: Option<LegacyAttachmentActions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub id: String,
    pub room_id: String,
    #[serde(default)]
    pub person_email: Option<String>,
    #[serde(default)]
    pub inputs: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct LegacyAttachmentActions {
    pub data: LegacyActionData,
}

#[derive(Debug, Deserialize)]
pub struct LegacyActionData {
    pub inputs: Map<String, Value>,
}

/// The two event shapes the bot handles.
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookEvent {
    Message {
        message_id: String,
        room_id: String,
        person_email: Option<String>,
    },
    CardSubmission {
        action_id: String,
        room_id: String,
        person_email: Option<String>,
        /// `None` when the inputs have to be fetched from the attachment action.
        inputs: Option<Map<String, Value>>,
    },
}

impl WebhookEvent {
    pub fn room_id(&self) -> &str {
        match self {
            WebhookEvent::Message { room_id, .. } | WebhookEvent::CardSubmission { room_id, .. } => room_id,
        }
    }

    pub fn person_email(&self) -> Option<&str> {
        match self {
            WebhookEvent::Message { person_email, .. }
            | WebhookEvent::CardSubmission { person_email, .. } => person_email.as_deref(),
        }
    }

    /// Delivery key used for duplicate detection: the message or attachment-action id.
    pub fn delivery_id(&self) -> &str {
        match self {
            WebhookEvent::Message { message_id, .. } => message_id,
            WebhookEvent::CardSubmission { action_id, .. } => action_id,
        }
    }
}

impl From<WebhookEnvelope> for WebhookEvent {
    fn from(env: WebhookEnvelope) -> Self {
        let WebhookEnvelope { resource, data, attachment_actions, .. } = env;
        let legacy_inputs = attachment_actions.map(|a| a.data.inputs);
        let is_card = resource.as_deref() == Some("attachmentActions")
            || legacy_inputs.is_some()
            || data.inputs.is_some();

        if is_card {
            WebhookEvent::CardSubmission {
                action_id: data.id,
                room_id: data.room_id,
                person_email: data.person_email,
                inputs: data.inputs.or(legacy_inputs),
            }
        } else {
            WebhookEvent::Message {
                message_id: data.id,
                room_id: data.room_id,
                person_email: data.person_email,
            }
        }
    }
}

/// What a pressed card button asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CardCommand {
    AskQuestion,
    StartQuiz,
    QuitQuiz,
    ContinueQuiz,
    RestartQuiz,
    QuizAnswer(String),
}

impl CardCommand {
    /// Decode card inputs. Accepts flat `{action, answer}` or the older
    /// `{inputs: {action}}` nesting. Unknown action strings are treated as quiz answers.
    pub fn from_inputs(inputs: &Map<String, Value>) -> Option<Self> {
        let inputs = match inputs.get("inputs").and_then(Value::as_object) {
            Some(nested) => nested,
            None => inputs,
        };
        let action = inputs.get("action").and_then(Value::as_str)?.trim();

        let cmd = match action {
            "AskQuestion" => CardCommand::AskQuestion,
            "StartQuiz" => CardCommand::StartQuiz,
            "QuitQuiz" => CardCommand::QuitQuiz,
            "ContinueQuiz" => CardCommand::ContinueQuiz,
            "RestartQuiz" => CardCommand::RestartQuiz,
            "QuizAnswer" => {
                let answer = inputs.get("answer").and_then(Value::as_str)?;
                CardCommand::QuizAnswer(answer.to_string())
            }
            "" => return None,
            other => CardCommand::QuizAnswer(other.to_string()),
        };
        Some(cmd)
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookAck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self { status: "received".into(), reason: None }
    }

    pub fn failed(status: &str, reason: impl Into<String>) -> Self {
        Self { status: status.into(), reason: Some(reason.into()) }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: Value) -> WebhookEvent {
        serde_json::from_value::<WebhookEnvelope>(v).unwrap().into()
    }

    #[test]
    fn decodes_plain_message() {
        let ev = decode(json!({
            "resource": "messages", "event": "created",
            "data": { "id": "msg-1", "roomId": "room-1", "personEmail": "kid@leaf.village" }
        }));
        assert_eq!(
            ev,
            WebhookEvent::Message {
                message_id: "msg-1".into(),
                room_id: "room-1".into(),
                person_email: Some("kid@leaf.village".into()),
            }
        );
        assert_eq!(ev.delivery_id(), "msg-1");
    }

    #[test]
    fn decodes_attachment_action_without_inputs() {
        let ev = decode(json!({
            "resource": "attachmentActions", "event": "created",
            "data": { "id": "act-1", "roomId": "room-1", "messageId": "msg-0", "type": "submit" }
        }));
        assert!(matches!(ev, WebhookEvent::CardSubmission { ref action_id, inputs: None, .. } if action_id == "act-1"));
    }

    #[test]
    fn decodes_legacy_inline_inputs() {
        let ev = decode(json!({
            "data": { "id": "msg-2", "roomId": "room-1", "personEmail": "kid@leaf.village" },
            "attachmentActions": { "data": { "inputs": { "action": "StartQuiz" } } }
        }));
        match ev {
            WebhookEvent::CardSubmission { inputs: Some(inputs), .. } => {
                assert_eq!(CardCommand::from_inputs(&inputs), Some(CardCommand::StartQuiz));
            }
            other => panic!("expected card submission, got {other:?}"),
        }
    }

    #[test]
    fn missing_room_is_rejected() {
        let res = serde_json::from_value::<WebhookEnvelope>(json!({ "data": { "id": "x" } }));
        assert!(res.is_err());
    }

    #[test]
    fn card_commands() {
        let m = |v: Value| v.as_object().cloned().unwrap();
        assert_eq!(CardCommand::from_inputs(&m(json!({"action": "AskQuestion"}))), Some(CardCommand::AskQuestion));
        assert_eq!(
            CardCommand::from_inputs(&m(json!({"inputs": {"action": "RestartQuiz"}}))),
            Some(CardCommand::RestartQuiz)
        );
        assert_eq!(
            CardCommand::from_inputs(&m(json!({"action": "QuizAnswer", "answer": "fight"}))),
            Some(CardCommand::QuizAnswer("fight".into()))
        );
        assert_eq!(
            CardCommand::from_inputs(&m(json!({"action": "talk"}))),
            Some(CardCommand::QuizAnswer("talk".into()))
        );
        assert_eq!(CardCommand::from_inputs(&m(json!({"action": "QuizAnswer"}))), None);
        assert_eq!(CardCommand::from_inputs(&m(json!({"answer": "x"}))), None);
    }
}
