//! UI Builder module for creating keyboards, captions and command lists

use teloxide::types::{BotCommand, InlineKeyboardButton, InlineKeyboardMarkup};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import tarot types
use crate::tarot::{CardReading, Orientation, SpreadKind};

const SPREAD_PREFIX: &str = "spread_";
const SETMODEL_PREFIX: &str = "setmodel_";
const CANCEL_READING: &str = "reading_cancel";

/// Action encoded in an inline keyboard button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Spread(SpreadKind),
    SetModel(usize),
    CancelReading,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if data == CANCEL_READING {
            return Some(CallbackAction::CancelReading);
        }
        if let Some(kind) = data.strip_prefix(SPREAD_PREFIX) {
            return kind.parse().ok().map(CallbackAction::Spread);
        }
        data.strip_prefix(SETMODEL_PREFIX)
            .and_then(|index| index.parse().ok())
            .map(CallbackAction::SetModel)
    }

    pub fn data(self) -> String {
        match self {
            CallbackAction::Spread(kind) => format!("{SPREAD_PREFIX}{}", kind.as_str()),
            CallbackAction::SetModel(index) => format!("{SETMODEL_PREFIX}{index}"),
            CallbackAction::CancelReading => CANCEL_READING.to_string(),
        }
    }
}

fn spread_label(kind: SpreadKind, language_code: Option<&str>) -> String {
    let key = match kind {
        SpreadKind::Single => "spread-single",
        SpreadKind::Three => "spread-three",
        SpreadKind::CelticCross => "spread-celtic",
    };
    t_lang(key, language_code)
}

/// Create inline keyboard for spread selection
pub fn create_spread_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<InlineKeyboardButton>> = SpreadKind::ALL
        .iter()
        .map(|&kind| {
            vec![InlineKeyboardButton::callback(
                spread_label(kind, language_code),
                CallbackAction::Spread(kind).data(),
            )]
        })
        .collect();

    buttons.push(vec![InlineKeyboardButton::callback(
        format!("❌ {}", t_lang("button-cancel", language_code)),
        CallbackAction::CancelReading.data(),
    )]);

    InlineKeyboardMarkup::new(buttons)
}

/// Create inline keyboard with one button per allowed model
pub fn create_model_keyboard(models: &[String], current: &str) -> InlineKeyboardMarkup {
    let buttons = models
        .iter()
        .enumerate()
        .map(|(i, model)| {
            let label = if model == current {
                format!("✅ {model}")
            } else {
                model.clone()
            };
            vec![InlineKeyboardButton::callback(
                label,
                CallbackAction::SetModel(i).data(),
            )]
        })
        .collect::<Vec<_>>();

    InlineKeyboardMarkup::new(buttons)
}

/// Plain-text model list with the active model marked
pub fn format_model_list(models: &[String], current: &str, language_code: Option<&str>) -> String {
    let mut result = t_lang("model-list-title", language_code);
    for model in models {
        let marker = if model == current { "✅" } else { "•" };
        result.push_str(&format!("\n{marker} {model}"));
    }
    result
}

/// Example selection shown in the prompt, e.g. "7 23 45"
pub fn selection_example(count: usize) -> String {
    const EXAMPLES: [usize; 10] = [7, 23, 45, 12, 66, 3, 51, 38, 74, 19];
    EXAMPLES
        .iter()
        .take(count.max(1))
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Photo caption for a drawn card (plain text)
pub fn card_caption(index: usize, reading: &CardReading, language_code: Option<&str>) -> String {
    let orientation_key = match reading.card.orientation {
        Orientation::Upright => "orientation-upright",
        Orientation::Reversed => "orientation-reversed",
    };
    let name = if language_code.is_some_and(|code| code.starts_with("en")) {
        reading.card.name.clone()
    } else {
        reading.card.display_name.clone()
    };

    let number = (index + 1).to_string();
    let orientation = t_lang(orientation_key, language_code);

    t_args_lang(
        "tarot-card-caption",
        &[
            ("index", number.as_str()),
            ("position", reading.position.as_str()),
            ("name", name.as_str()),
            ("orientation", orientation.as_str()),
        ],
        language_code,
    )
}

/// Commands registered with Telegram for autocomplete
pub fn bot_commands(language_code: Option<&str>) -> Vec<BotCommand> {
    [
        ("start", "cmd-start"),
        ("help", "cmd-help"),
        ("tarot", "cmd-tarot"),
        ("cancel", "cmd-cancel"),
        ("history", "cmd-history"),
        ("clear", "cmd-clear"),
        ("setmodel", "cmd-setmodel"),
        ("listmodels", "cmd-listmodels"),
        ("model", "cmd-model"),
    ]
    .into_iter()
    .map(|(command, key)| BotCommand::new(command, t_lang(key, language_code)))
    .collect()
}
