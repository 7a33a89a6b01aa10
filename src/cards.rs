//! Adaptive card payloads sent through Webex.
//!
//! Cards are typed: a body of display elements plus submit actions whose `data`
//! carries the action identifier the webhook dispatcher decodes on the way back.

use serde::Serialize;

use crate::domain::QuizQuestion;
use crate::result::QuizResult;

pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";

#[derive(Clone, Debug, Serialize)]
pub struct AdaptiveCard {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: &'static str,
    #[serde(rename = "$schema")]
    pub schema: &'static str,
    pub body: Vec<CardElement>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CardAction>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum CardElement {
    TextBlock {
        text: String,
        wrap: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        weight: Option<&'static str>,
    },
    Image {
        url: String,
        size: &'static str,
        #[serde(rename = "altText")]
        alt_text: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum CardAction {
    #[serde(rename = "Action.Submit")]
    Submit {
        title: String,
        id: String,
        data: SubmitData,
    },
}

/// Payload echoed back in the `attachmentActions` inputs when a button is pressed.
#[derive(Clone, Debug, Serialize)]
pub struct SubmitData {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl AdaptiveCard {
    fn new(body: Vec<CardElement>, actions: Vec<CardAction>) -> Self {
        Self { kind: "AdaptiveCard", version: "1.3", schema: ADAPTIVE_CARD_SCHEMA, body, actions }
    }
}

fn title(text: impl Into<String>) -> CardElement {
    CardElement::TextBlock { text: text.into(), wrap: true, size: Some("Medium"), weight: Some("Bolder") }
}

fn paragraph(text: impl Into<String>) -> CardElement {
    CardElement::TextBlock { text: text.into(), wrap: true, size: None, weight: None }
}

fn submit(title: impl Into<String>, id: impl Into<String>, action: &str, answer: Option<String>) -> CardAction {
    CardAction::Submit {
        title: title.into(),
        id: id.into(),
        data: SubmitData { action: action.to_string(), answer },
    }
}

pub const GREETING_TEXT: &str = "Narubot is here, dattabayo! What would you like to do?";

pub fn greeting_card() -> AdaptiveCard {
    AdaptiveCard::new(
        vec![title(GREETING_TEXT)],
        vec![
            submit("Ask me a question about Naruto", "ask_question_action", "AskQuestion", None),
            submit("Take a personality quiz", "start_quiz_action", "StartQuiz", None),
        ],
    )
}

pub const RESUME_PROMPT_TEXT: &str = "You have an incomplete quiz. Would you like to continue or restart?";

/// Offered instead of the greeting while a quiz is still in progress.
pub fn resume_prompt_card(index: usize, total: usize) -> AdaptiveCard {
    AdaptiveCard::new(
        vec![
            title(RESUME_PROMPT_TEXT),
            paragraph(format!("You stopped at question {} of {}.", index + 1, total)),
        ],
        vec![
            submit("Continue", "continue_quiz_action", "ContinueQuiz", None),
            submit("Restart", "restart_quiz_action", "RestartQuiz", None),
        ],
    )
}

/// One submit button per option; `index` is 0-based.
pub fn question_card(index: usize, total: usize, question: &QuizQuestion) -> AdaptiveCard {
    let mut actions: Vec<CardAction> = question
        .options
        .iter()
        .enumerate()
        .map(|(i, o)| {
            submit(
                o.text.clone(),
                format!("quiz_q{}_option{}", index + 1, i + 1),
                "QuizAnswer",
                Some(o.text.clone()),
            )
        })
        .collect();
    actions.push(submit("Quit quiz", "quit_quiz_action", "QuitQuiz", None));

    AdaptiveCard::new(
        vec![
            paragraph(format!("Question {} of {}", index + 1, total)),
            title(question.prompt.clone()),
        ],
        actions,
    )
}

/// Plain-text rendering of a question, used as the card's markdown fallback.
pub fn question_markdown(index: usize, total: usize, question: &QuizQuestion) -> String {
    let mut out = format!("**Question {} of {}**: {}\n", index + 1, total, question.prompt);
    for (i, o) in question.options.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, o.text));
    }
    out.push_str("Reply with the option number or text, or 'quit' to stop.");
    out
}

pub fn result_card(result: &QuizResult) -> AdaptiveCard {
    let mut body = Vec::new();
    if let Some(url) = &result.image {
        body.push(CardElement::Image { url: url.clone(), size: "Large", alt_text: result.category.clone() });
    }
    body.push(title(format!("You are most like {}!", result.category)));
    body.push(paragraph(result.description.clone()));
    AdaptiveCard::new(
        body,
        vec![submit("Take the quiz again", "restart_quiz_action", "RestartQuiz", None)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuizOption;
    use serde_json::json;

    #[test]
    fn greeting_card_shape() {
        let v = serde_json::to_value(greeting_card()).unwrap();
        assert_eq!(v["type"], "AdaptiveCard");
        assert_eq!(v["$schema"], ADAPTIVE_CARD_SCHEMA);
        assert_eq!(v["actions"][0]["type"], "Action.Submit");
        assert_eq!(v["actions"][0]["data"], json!({ "action": "AskQuestion" }));
        assert_eq!(v["actions"][1]["data"]["action"], "StartQuiz");
    }

    #[test]
    fn question_card_carries_answers() {
        let q = QuizQuestion {
            prompt: "Pick one".into(),
            options: vec![
                QuizOption { text: "fight".into(), category: "Naruto".into(), weight: 2 },
                QuizOption { text: "talk".into(), category: "Sakura".into(), weight: 2 },
            ],
        };
        let v = serde_json::to_value(question_card(0, 3, &q)).unwrap();
        assert_eq!(v["body"][0]["text"], "Question 1 of 3");
        assert_eq!(v["body"][1]["text"], "Pick one");
        assert_eq!(v["actions"][1]["data"], json!({ "action": "QuizAnswer", "answer": "talk" }));
        assert_eq!(v["actions"][2]["data"]["action"], "QuitQuiz");

        let md = question_markdown(0, 3, &q);
        assert!(md.contains("1. fight"));
        assert!(md.contains("2. talk"));
    }

    #[test]
    fn resume_prompt_offers_continue_and_restart() {
        let v = serde_json::to_value(resume_prompt_card(1, 3)).unwrap();
        assert_eq!(v["body"][0]["text"], RESUME_PROMPT_TEXT);
        assert_eq!(v["body"][1]["text"], "You stopped at question 2 of 3.");
        assert_eq!(v["actions"][0]["data"], json!({ "action": "ContinueQuiz" }));
        assert_eq!(v["actions"][1]["data"], json!({ "action": "RestartQuiz" }));
    }

    #[test]
    fn result_card_skips_missing_image() {
        let r = QuizResult { category: "Sakura".into(), description: "Smart.".into(), image: None, score: 2 };
        let v = serde_json::to_value(result_card(&r)).unwrap();
        assert_eq!(v["body"][0]["type"], "TextBlock");
        assert_eq!(v["body"][0]["text"], "You are most like Sakura!");

        let r = QuizResult { image: Some("https://img/s.png".into()), ..r };
        let v = serde_json::to_value(result_card(&r)).unwrap();
        assert_eq!(v["body"][0]["type"], "Image");
        assert_eq!(v["body"][0]["altText"], "Sakura");
    }
}
