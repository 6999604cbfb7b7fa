//! # Tarot Chat Bot
//!
//! A Telegram bot that chats through a Groq-hosted language model and runs
//! guided tarot readings. Model output is rendered into Telegram's HTML or
//! MarkdownV2 dialect before delivery.

pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod history;
pub mod llm;
pub mod localization;
pub mod model_selector;
pub mod render;
pub mod tarot;
