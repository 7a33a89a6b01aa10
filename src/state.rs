//! Application state: settings, Webex gateway, AI backend, quiz engine and the
//! recent-delivery window used to drop duplicate webhook deliveries.
//!
//! Everything is built once from `Settings` and shared behind an `Arc`; there is
//! no process-wide mutable state.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::ai::AiBackend;
use crate::config::{load_bank_and_prompts, AiSettings, Prompts, Settings};
use crate::error::BotError;
use crate::openai::OpenAI;
use crate::quiz::QuizEngine;
use crate::store::connect_store;
use crate::vertex::VertexAi;
use crate::webex::{MessagingGateway, WebexClient};

const RECENT_DELIVERY_CAPACITY: usize = 1024;

pub struct AppState {
    pub bot_email: Option<String>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub ai: Option<AiBackend>,
    pub prompts: Prompts,
    pub quiz: QuizEngine,
    pub recent: RecentDeliveries,
}

impl AppState {
    /// Build state from settings: quiz bank, session store, Webex client and AI backend.
    #[instrument(level = "info", skip_all)]
    pub async fn from_settings(settings: &Settings) -> Result<Self, BotError> {
        let (bank, prompts) = load_bank_and_prompts(&settings.quiz_config_path);
        info!(target: "quiz", questions = bank.len(), characters = bank.characters.len(), "Quiz bank inventory");

        let store = connect_store(&settings.session_store_url).await?;
        let gateway = WebexClient::new(settings.webex_access_token.clone(), settings.webex_base_url.clone())?;
        let ai = build_ai_backend(&settings.ai)?;

        match &ai {
            Some(b) => info!(target: "narubot", backend = b.name(), model = %b.model(), "AI backend enabled."),
            None => info!(target: "narubot", "AI backend disabled. Using local stub replies."),
        }

        Ok(Self::new(
            settings.bot_email.clone(),
            Arc::new(gateway),
            ai,
            prompts,
            QuizEngine::new(Arc::new(bank), store),
        ))
    }

    pub fn new(
        bot_email: Option<String>,
        gateway: Arc<dyn MessagingGateway>,
        ai: Option<AiBackend>,
        prompts: Prompts,
        quiz: QuizEngine,
    ) -> Self {
        Self {
            bot_email,
            gateway,
            ai,
            prompts,
            quiz,
            recent: RecentDeliveries::new(RECENT_DELIVERY_CAPACITY),
        }
    }

    /// True when the event was authored by the bot itself.
    pub fn is_own_event(&self, person_email: Option<&str>) -> bool {
        match (&self.bot_email, person_email) {
            (Some(bot), Some(author)) => bot.eq_ignore_ascii_case(author),
            _ => false,
        }
    }
}

fn build_ai_backend(settings: &AiSettings) -> Result<Option<AiBackend>, BotError> {
    let backend = match settings {
        AiSettings::Vertex { project_id, region, model, access_token, base_url } => Some(AiBackend::Vertex(
            VertexAi::new(access_token.clone(), project_id, region, model.clone(), base_url.clone())?,
        )),
        AiSettings::OpenAi { api_key, base_url, model } => Some(AiBackend::OpenAi(OpenAI::new(
            api_key.clone(),
            base_url.clone(),
            model.clone(),
        )?)),
        AiSettings::Disabled => None,
    };
    Ok(backend)
}

/// Bounded window of recently seen delivery ids (oldest evicted first).
pub struct RecentDeliveries {
    capacity: usize,
    inner: Mutex<(HashSet<String>, VecDeque<String>)>,
}

impl RecentDeliveries {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new((HashSet::new(), VecDeque::new())) }
    }

    /// Record `id`; returns false if it was already in the window.
    pub async fn first_sighting(&self, id: &str) -> bool {
        let mut guard = self.inner.lock().await;
        let (seen, order) = &mut *guard;
        if seen.contains(id) {
            return false;
        }
        seen.insert(id.to_string());
        order.push_back(id.to_string());
        while order.len() > self.capacity {
            if let Some(old) = order.pop_front() {
                seen.remove(&old);
            }
        }
        true
    }

    /// Drop `id` from the window so a redelivery after a failed attempt is processed again.
    pub async fn forget(&self, id: &str) {
        let mut guard = self.inner.lock().await;
        let (seen, order) = &mut *guard;
        if seen.remove(id) {
            order.retain(|x| x != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_deliveries_detects_repeats_and_evicts() {
        let recent = RecentDeliveries::new(2);
        assert!(recent.first_sighting("a").await);
        assert!(!recent.first_sighting("a").await);
        assert!(recent.first_sighting("b").await);
        assert!(recent.first_sighting("c").await);
        // "a" fell out of the window
        assert!(recent.first_sighting("a").await);
        assert!(!recent.first_sighting("c").await);

        recent.forget("c").await;
        assert!(recent.first_sighting("c").await);
    }

    #[test]
    fn ai_backend_follows_settings() {
        assert!(build_ai_backend(&AiSettings::Disabled).unwrap().is_none());
        let b = build_ai_backend(&AiSettings::OpenAi {
            api_key: "sk".into(),
            base_url: "http://localhost:1".into(),
            model: "m".into(),
        })
        .unwrap()
        .unwrap();
        assert_eq!(b.name(), "openai");
        assert_eq!(b.model(), "m");
    }
}
