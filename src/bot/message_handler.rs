//! Message Handler module for routing incoming Telegram messages
//!
//! Commands are handled first. Other text goes to the reading workflow when
//! the user has an active session, and to plain chat otherwise.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import rendering
use crate::render::{chunk_rendered, strip_reasoning, Dialect};

// Import conversation types
use crate::errors::WorkflowError;
use crate::llm::ChatMessage;

// Import tarot types
use crate::tarot::workflow::{parse_selection, MAX_QUESTION_CHARS};
use crate::tarot::{Reading, SpreadKind, WorkflowState};

use super::delivery::{send_card, send_rendered, send_typing};
use super::ui_builder::{
    card_caption, create_model_keyboard, create_spread_keyboard, format_model_list,
    selection_example,
};
use super::{user_language, AppState};

use crate::config::TELEGRAM_MESSAGE_LIMIT;

/// Bot commands understood by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Tarot,
    Cancel,
    Clear,
    History,
    SetModel,
    ListModels,
    Model,
}

/// Split `/command@botname args` into the command and its argument text
pub fn parse_command(text: &str) -> Option<(Command, &str)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (word, args) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim()),
        None => (rest, ""),
    };
    let name = word.split('@').next().unwrap_or(word).to_ascii_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "tarot" => Command::Tarot,
        "cancel" => Command::Cancel,
        "clear" => Command::Clear,
        "history" => Command::History,
        "setmodel" => Command::SetModel,
        "listmodels" => Command::ListModels,
        "model" => Command::Model,
        _ => return None,
    };
    Some((command, args))
}

pub async fn message_handler(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    match msg.text() {
        Some(text) => handle_text_message(&bot, &msg, &state, text).await?,
        None => {
            debug!(user_id = %msg.chat.id, "Received non-text message from user");
            let language_code = user_language(msg.from.as_ref());
            bot.send_message(msg.chat.id, t_lang("help-text", language_code))
                .await?;
        }
    }
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    state: &Arc<AppState>,
    text: &str,
) -> Result<()> {
    let chat_id = msg.chat.id;
    let language_code = user_language(msg.from.as_ref());
    debug!(user_id = %chat_id, message_length = text.len(), "Received text message from user");

    if let Some((command, args)) = parse_command(text) {
        return handle_command(bot, chat_id, state, command, args, language_code).await;
    }

    match state.workflow.current_state(chat_id.0) {
        Some(WorkflowState::AwaitingQuestion) => {
            handle_question_input(bot, chat_id, state, text, language_code).await
        }
        Some(WorkflowState::AwaitingSpreadChoice) => match text.parse::<SpreadKind>() {
            Ok(kind) => apply_spread(bot, chat_id, state, kind, language_code).await,
            Err(_) => {
                bot.send_message(chat_id, t_lang("tarot-unknown-spread", language_code))
                    .reply_markup(create_spread_keyboard(language_code))
                    .await?;
                Ok(())
            }
        },
        Some(WorkflowState::AwaitingSelection) => {
            handle_selection_input(bot, chat_id, state, text, language_code).await
        }
        Some(WorkflowState::Interpreting) => {
            bot.send_message(chat_id, t_lang("tarot-in-progress", language_code))
                .await?;
            Ok(())
        }
        None => handle_chat_message(bot, chat_id, state, text, language_code).await,
    }
}

async fn handle_command(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    command: Command,
    args: &str,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %chat_id, command = ?command, "Handling command");

    match command {
        Command::Start => {
            bot.send_message(chat_id, t_lang("welcome", language_code))
                .await?;
        }
        Command::Help => {
            bot.send_message(chat_id, t_lang("help-text", language_code))
                .await?;
        }
        Command::Tarot => {
            let reply = match state.workflow.start(chat_id.0) {
                Ok(_) => t_lang("tarot-ask-question", language_code),
                Err(_) => t_lang("tarot-already-active", language_code),
            };
            bot.send_message(chat_id, reply).await?;
        }
        Command::Cancel => {
            let reply = if state.workflow.cancel(chat_id.0) {
                t_lang("tarot-cancelled", language_code)
            } else {
                t_lang("tarot-no-session", language_code)
            };
            bot.send_message(chat_id, reply).await?;
        }
        Command::Clear => {
            state.history.clear(chat_id.0);
            bot.send_message(chat_id, t_lang("history-cleared", language_code))
                .await?;
        }
        Command::History => {
            let transcript = state.history.render_readable(
                chat_id.0,
                &t_lang("history-user-label", language_code),
                &t_lang("history-assistant-label", language_code),
            );
            if transcript.is_empty() {
                bot.send_message(chat_id, t_lang("history-empty", language_code))
                    .await?;
            } else {
                for chunk in chunk_rendered(&transcript, Dialect::Html, TELEGRAM_MESSAGE_LIMIT) {
                    bot.send_message(chat_id, chunk)
                        .parse_mode(ParseMode::Html)
                        .await?;
                }
            }
        }
        Command::SetModel if args.is_empty() => {
            let keyboard = create_model_keyboard(state.models.available(), &state.models.current());
            bot.send_message(chat_id, t_lang("model-choose", language_code))
                .reply_markup(keyboard)
                .await?;
        }
        Command::SetModel => {
            let reply = model_change_reply(state, state.models.set(args).is_ok(), language_code);
            bot.send_message(chat_id, reply).await?;
        }
        Command::ListModels => {
            let list = format_model_list(
                state.models.available(),
                &state.models.current(),
                language_code,
            );
            bot.send_message(chat_id, list).await?;
        }
        Command::Model => {
            let current = state.models.current();
            bot.send_message(
                chat_id,
                t_args_lang("model-current", &[("model", current.as_str())], language_code),
            )
            .await?;
        }
    }
    Ok(())
}

/// Reply after a model change attempt: the new model, or the allow-list
pub(crate) fn model_change_reply(state: &AppState, changed: bool, language_code: Option<&str>) -> String {
    if changed {
        let current = state.models.current();
        t_args_lang("model-changed", &[("model", current.as_str())], language_code)
    } else {
        let models = state.models.available().join("\n");
        t_args_lang("model-unknown", &[("models", models.as_str())], language_code)
    }
}

async fn handle_question_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    match state.workflow.submit_question(chat_id.0, text) {
        Ok(_) => {
            bot.send_message(chat_id, t_lang("tarot-choose-spread", language_code))
                .reply_markup(create_spread_keyboard(language_code))
                .await?;
        }
        Err(WorkflowError::InvalidQuestion("too long")) => {
            let max = MAX_QUESTION_CHARS.to_string();
            bot.send_message(
                chat_id,
                t_args_lang("tarot-question-too-long", &[("max", max.as_str())], language_code),
            )
            .await?;
        }
        Err(WorkflowError::InvalidQuestion(_)) => {
            bot.send_message(chat_id, t_lang("tarot-question-empty", language_code))
                .await?;
        }
        Err(e) => {
            warn!(user_id = %chat_id, error = %e, "Question rejected");
            bot.send_message(chat_id, t_lang("tarot-no-session", language_code))
                .await?;
        }
    }
    Ok(())
}

/// Apply a spread choice from text or keyboard and ask for the card numbers
pub(crate) async fn apply_spread(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    kind: SpreadKind,
    language_code: Option<&str>,
) -> Result<()> {
    match state.workflow.select_spread(chat_id.0, kind) {
        Ok(_) => {
            let count = kind.draw_count().to_string();
            let example = selection_example(kind.draw_count());
            bot.send_message(
                chat_id,
                t_args_lang(
                    "tarot-ask-selection",
                    &[("count", count.as_str()), ("example", example.as_str())],
                    language_code,
                ),
            )
            .await?;
        }
        Err(WorkflowError::UnexpectedInput {
            state: WorkflowState::Interpreting,
        }) => {
            bot.send_message(chat_id, t_lang("tarot-in-progress", language_code))
                .await?;
        }
        Err(e) => {
            debug!(user_id = %chat_id, error = %e, "Spread choice not accepted");
            bot.send_message(chat_id, t_lang("tarot-no-session", language_code))
                .await?;
        }
    }
    Ok(())
}

/// Validate the numbers and start the reading in its own task
///
/// The dispatcher handles one update per chat at a time, so the reading must
/// not run inside the handler or a `/cancel` from the same chat would wait
/// until every interpretation call had finished.
async fn handle_selection_input(
    bot: &Bot,
    chat_id: ChatId,
    state: &Arc<AppState>,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(spread) = state.workflow.current_spread(chat_id.0) else {
        bot.send_message(chat_id, t_lang("tarot-no-session", language_code))
            .await?;
        return Ok(());
    };

    if let Err(e) = parse_selection(text, spread.draw_count()) {
        debug!(user_id = %chat_id, error = %e, "Invalid card selection");
        let count = spread.draw_count().to_string();
        bot.send_message(
            chat_id,
            t_args_lang("tarot-invalid-selection", &[("count", count.as_str())], language_code),
        )
        .await?;
        return Ok(());
    }

    bot.send_message(chat_id, t_lang("tarot-interpreting", language_code))
        .await?;

    let bot = bot.clone();
    let state = Arc::clone(state);
    let selection = text.to_string();
    let language_code = language_code.map(str::to_string);
    tokio::spawn(async move {
        let language_code = language_code.as_deref();
        if let Err(e) = run_reading(&bot, chat_id, &state, spread, &selection, language_code).await {
            error!(user_id = %chat_id, error = %e, "Reading task failed");
        }
    });
    Ok(())
}

/// Interpret the selected cards and deliver the result
async fn run_reading(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    spread: SpreadKind,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let model = state.models.current();
    let backend = &state.backend;
    let result = state
        .workflow
        .submit_selection(chat_id.0, text, |messages: Vec<ChatMessage>| {
            let bot = bot.clone();
            let model = model.clone();
            async move {
                send_typing(&bot, chat_id).await;
                backend.complete_chat(&model, &messages).await
            }
        })
        .await;

    match result {
        Ok(reading) => deliver_reading(bot, chat_id, state, &reading, language_code).await,
        Err(WorkflowError::Cancelled) => {
            info!(user_id = %chat_id, "Reading cancelled, nothing to deliver");
            Ok(())
        }
        Err(WorkflowError::InvalidSelection(reason)) => {
            debug!(user_id = %chat_id, reason = %reason, "Invalid card selection");
            let count = spread.draw_count().to_string();
            bot.send_message(
                chat_id,
                t_args_lang("tarot-invalid-selection", &[("count", count.as_str())], language_code),
            )
            .await?;
            Ok(())
        }
        Err(e) => {
            error!(user_id = %chat_id, error = %e, "Tarot reading failed");
            bot.send_message(chat_id, t_lang("tarot-failed", language_code))
                .await?;
            Ok(())
        }
    }
}

/// Send each card's image and interpretation, then the overall reading
async fn deliver_reading(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    reading: &Reading,
    language_code: Option<&str>,
) -> Result<()> {
    let dialect = state.config.dialect;
    for (index, card_reading) in reading.cards.iter().enumerate() {
        let caption = card_caption(index, card_reading, language_code);
        send_card(bot, chat_id, &card_reading.card.image_ref, &caption).await?;
        send_rendered(bot, chat_id, &card_reading.interpretation, dialect).await?;
    }

    let overall = format!(
        "**{}**\n\n{}",
        t_lang("tarot-overall-title", language_code),
        reading.overall
    );
    send_rendered(bot, chat_id, &overall, dialect).await?;

    info!(user_id = %chat_id, cards = reading.cards.len(), "Reading delivered");
    Ok(())
}

/// Plain chat: system prompt, history and the new turn go to the current model
async fn handle_chat_message(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    send_typing(bot, chat_id).await;

    let mut messages = vec![ChatMessage::system(state.config.system_prompt.as_str())];
    messages.extend(state.history.get(chat_id.0));
    messages.push(ChatMessage::user(text));

    let model = state.models.current();
    match state.backend.complete_chat(&model, &messages).await {
        Ok(reply) => {
            state.history.append(chat_id.0, text, &strip_reasoning(&reply));
            info!(user_id = %chat_id, model = %model, reply_chars = reply.len(), "Chat reply received");
            send_rendered(bot, chat_id, &reply, state.config.dialect).await
        }
        Err(e) => {
            error!(user_id = %chat_id, model = %model, error = %e, "Chat completion failed");
            bot.send_message(chat_id, t_lang("chat-error", language_code))
                .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some((Command::Start, "")));
        assert_eq!(parse_command("/tarot@TarotBot"), Some((Command::Tarot, "")));
        assert_eq!(
            parse_command("/setmodel  llama-3.3-70b "),
            Some((Command::SetModel, "llama-3.3-70b"))
        );
        assert_eq!(parse_command("/ListModels"), Some((Command::ListModels, "")));
        assert_eq!(parse_command("/unknown"), None);
        assert_eq!(parse_command("hello /start"), None);
    }
}
