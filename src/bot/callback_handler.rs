//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

// Import localization
use crate::localization::t_lang;

use super::message_handler::{apply_spread, model_change_reply};
use super::ui_builder::CallbackAction;
use super::AppState;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> Result<()> {
    debug!(user_id = %q.from.id, "Received callback query from user");

    let language_code = q.from.language_code.as_deref();
    let data = q.data.as_deref().unwrap_or("");

    if let Some(msg) = &q.message {
        let chat_id = msg.chat().id;
        match CallbackAction::parse(data) {
            Some(CallbackAction::Spread(kind)) => {
                apply_spread(&bot, chat_id, &state, kind, language_code).await?;
            }
            Some(CallbackAction::SetModel(index)) => {
                let changed = state.models.set_index(index).is_ok();
                let reply = model_change_reply(&state, changed, language_code);
                bot.send_message(chat_id, reply).await?;
            }
            Some(CallbackAction::CancelReading) => {
                let reply = if state.workflow.cancel(chat_id.0) {
                    t_lang("tarot-cancelled", language_code)
                } else {
                    t_lang("tarot-no-session", language_code)
                };
                bot.send_message(chat_id, reply).await?;
            }
            None => {
                debug!(user_id = %q.from.id, data = %data, "Ignoring unknown callback data");
            }
        }
    }

    // Answer the callback query to remove the loading state
    bot.answer_callback_query(q.id.clone()).await?;

    Ok(())
}
