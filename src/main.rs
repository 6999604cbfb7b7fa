use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tarot_chat_bot::bot::{self, AppState};
use tarot_chat_bot::config::BotConfig;
use tarot_chat_bot::localization::init_localization;

/// How often expired reading sessions are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting Tarot Chat Bot");

    init_localization()?;

    let config = BotConfig::from_env()?;
    info!(
        models = ?config.models,
        dialect = ?config.dialect,
        max_history_pairs = config.max_history_pairs,
        session_ttl_minutes = config.session_ttl_minutes,
        "Configuration loaded"
    );

    let bot = Bot::new(config.telegram_token.clone());
    let state = Arc::new(AppState::new(config)?);

    // Register bot commands for autocomplete
    if let Err(e) = bot.set_my_commands(bot::bot_commands(None)).await {
        error!(error = %e, "Failed to set bot commands");
    }

    // Sweep idle reading sessions in the background
    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.workflow.purge_expired();
        }
    });

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
