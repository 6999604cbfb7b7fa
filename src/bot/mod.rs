//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Routes text messages to commands, the reading workflow or plain chat
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards, captions and command lists
//! - `delivery`: Renders, chunks and sends model output with a plain-text fallback

pub mod callback_handler;
pub mod delivery;
pub mod message_handler;
pub mod ui_builder;

use anyhow::{anyhow, Result};

use crate::config::BotConfig;
use crate::history::HistoryStore;
use crate::llm::GroqClient;
use crate::model_selector::ModelSelector;
use crate::tarot::WorkflowEngine;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;
pub use ui_builder::bot_commands;

/// Everything the handlers share, injected through the dispatcher
pub struct AppState {
    pub config: BotConfig,
    pub history: HistoryStore,
    pub workflow: WorkflowEngine,
    pub models: ModelSelector,
    pub backend: GroqClient,
}

impl AppState {
    pub fn new(config: BotConfig) -> Result<Self> {
        let history = HistoryStore::new(config.max_history_pairs);
        let workflow = WorkflowEngine::new(config.session_ttl()?, config.image_base_url.clone());
        let models = ModelSelector::new(config.models.clone()).map_err(|e| anyhow!(e))?;
        let backend = GroqClient::new(config.backend.clone())?;

        Ok(Self {
            config,
            history,
            workflow,
            models,
            backend,
        })
    }
}

/// Language code of the user who sent an update
pub(crate) fn user_language(user: Option<&teloxide::types::User>) -> Option<&str> {
    user.and_then(|user| user.language_code.as_deref())
}
