//! # Markup Rendering Module
//!
//! Converts raw model output into text that Telegram's strict parsers accept,
//! in one of two dialects:
//!
//! - [`Dialect::Html`]: `<b>`, `<i>`, `<code>`, `<pre>`; `&`, `<`, `>` entity-escaped
//! - [`Dialect::MarkdownV2`]: punctuation backslash-escaped outside code
//!
//! ## Pipeline
//!
//! 1. Complete `<think>…</think>` reasoning blocks are removed (non-greedy)
//! 2. Fenced code blocks are cut out and emitted in the dialect's code construct
//! 3. The remaining text is escaped exactly once and `**bold**` is converted
//!
//! Rendering is idempotent: feeding rendered output back through [`render`]
//! with the same dialect returns it unchanged. An unterminated reasoning
//! block or code fence makes the rest of the input plain escaped text.

pub mod chunk;
pub mod html;
pub mod markdown;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::str::FromStr;

pub use chunk::{chunk_plain, chunk_rendered};

const REASONING_OPEN: &str = "<think>";
const FENCE: &str = "```";

lazy_static! {
    static ref REASONING_BLOCK: Regex =
        Regex::new(r"(?s)<think>.*?</think>").expect("Reasoning pattern should be valid");
    static ref LANGUAGE_TAG: Regex = Regex::new(r"^[ \t]*([A-Za-z0-9_+#.\-]{0,32})[ \t\r]*$")
        .expect("Language tag pattern should be valid");
}

/// Target markup dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Html,
    MarkdownV2,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Dialect::Html),
            "markdown" | "markdownv2" | "md" => Ok(Dialect::MarkdownV2),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// Render raw model output into `dialect`. Never fails.
pub fn render(raw: &str, dialect: Dialect) -> String {
    let (body, tail) = split_reasoning(raw);

    if let Some(tail) = &tail {
        debug!("Unterminated reasoning block, escaping {} bytes as plain text", tail.len());
    }

    match dialect {
        Dialect::Html => {
            let mut out = html::render_body(&body);
            if let Some(tail) = tail {
                out.push_str(&html::escape_plain(&tail));
            }
            out
        }
        // The tail may owe a space to a closing `*` at the end of the body
        Dialect::MarkdownV2 => markdown::render_body(&body, tail.as_deref()),
    }
}

/// Escape `text` so that it displays literally in `dialect`
pub fn escape_plain(text: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Html => html::escape_plain(text),
        Dialect::MarkdownV2 => markdown::escape_plain(text),
    }
}

/// Raw text with reasoning blocks removed, for history and plain-text fallbacks
pub fn strip_reasoning(raw: &str) -> String {
    let (body, tail) = split_reasoning(raw);
    match tail {
        Some(tail) => body + &tail,
        None => body,
    }
}

/// Remove complete reasoning blocks and trim; split off an unterminated one
fn split_reasoning(raw: &str) -> (String, Option<String>) {
    let cleaned = REASONING_BLOCK.replace_all(raw, "");
    let cleaned = cleaned.trim();
    match cleaned.find(REASONING_OPEN) {
        Some(idx) => (cleaned[..idx].to_string(), Some(cleaned[idx..].to_string())),
        None => (cleaned.to_string(), None),
    }
}

/// A fenced code block parsed from text starting with "```"
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fence<'a> {
    pub lang: Option<&'a str>,
    pub content: &'a str,
    /// Bytes consumed including both fences
    pub len: usize,
}

/// Parse a fence at the start of `text`; `None` when it is never closed
pub(crate) fn parse_fence(text: &str) -> Option<Fence<'_>> {
    let after = text.strip_prefix(FENCE)?;
    let close = after.find(FENCE)?;
    let inner = &after[..close];

    let (lang, content) = match inner.find('\n') {
        Some(nl) => match LANGUAGE_TAG.captures(&inner[..nl]) {
            Some(caps) => {
                let tag = caps.get(1).map_or("", |m| m.as_str());
                let lang = if tag.is_empty() { None } else { Some(tag) };
                (lang, &inner[nl + 1..])
            }
            None => (None, inner),
        },
        None => (None, inner),
    };

    Some(Fence {
        lang,
        content,
        len: FENCE.len() + close + FENCE.len(),
    })
}

pub(crate) fn is_valid_language(tag: &str) -> bool {
    !tag.is_empty() && !tag.contains(char::is_whitespace) && LANGUAGE_TAG.is_match(tag)
}
