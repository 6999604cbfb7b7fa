//! Delivery module: renders model output, splits it to Telegram's size limit
//! and falls back to plain text when Telegram rejects the markup.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, ParseMode};
use tracing::{debug, warn};

use crate::config::TELEGRAM_MESSAGE_LIMIT;
use crate::render::{chunk_plain, chunk_rendered, render, strip_reasoning, Dialect};

/// Telegram caption limit for photos
const CAPTION_LIMIT: usize = 1024;

pub fn parse_mode(dialect: Dialect) -> ParseMode {
    match dialect {
        Dialect::Html => ParseMode::Html,
        Dialect::MarkdownV2 => ParseMode::MarkdownV2,
    }
}

/// Render `raw` model output and send it, chunked, in `dialect`
///
/// If Telegram rejects a chunk, the whole reply is sent again as plain text
/// with reasoning removed and no parse mode.
pub async fn send_rendered(bot: &Bot, chat_id: ChatId, raw: &str, dialect: Dialect) -> Result<()> {
    let rendered = render(raw, dialect);
    let chunks = chunk_rendered(&rendered, dialect, TELEGRAM_MESSAGE_LIMIT);
    if chunks.is_empty() {
        debug!(user_id = %chat_id, "Rendered reply is empty, nothing to send");
        return Ok(());
    }

    for (index, chunk) in chunks.iter().enumerate() {
        if let Err(e) = bot
            .send_message(chat_id, chunk)
            .parse_mode(parse_mode(dialect))
            .await
        {
            warn!(
                user_id = %chat_id,
                chunk = index,
                chunks = chunks.len(),
                error = %e,
                "Telegram rejected rendered reply, resending as plain text"
            );
            return send_plain(bot, chat_id, &strip_reasoning(raw)).await;
        }
    }

    debug!(user_id = %chat_id, chunks = chunks.len(), "Rendered reply delivered");
    Ok(())
}

/// Send text without any parse mode, chunked by characters
pub async fn send_plain(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    for chunk in chunk_plain(text, TELEGRAM_MESSAGE_LIMIT) {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}

/// Send a card image with a plain caption; the caption alone if the image fails
pub async fn send_card(bot: &Bot, chat_id: ChatId, image_ref: &str, caption: &str) -> Result<()> {
    let caption: String = caption.chars().take(CAPTION_LIMIT).collect();

    match reqwest::Url::parse(image_ref) {
        Ok(url) => match bot.send_photo(chat_id, InputFile::url(url)).caption(caption.clone()).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                warn!(user_id = %chat_id, image = %image_ref, error = %e, "Failed to send card image");
            }
        },
        Err(e) => {
            warn!(user_id = %chat_id, image = %image_ref, error = %e, "Invalid card image URL");
        }
    }

    bot.send_message(chat_id, caption).await?;
    Ok(())
}

/// Show the "typing…" indicator; failures are only logged
pub async fn send_typing(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!(user_id = %chat_id, error = %e, "Failed to send chat action");
    }
}
