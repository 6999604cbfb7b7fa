//! Telegram HTML dialect.
//!
//! Supported constructs are `<b>`, `<i>`, inline `<code>` and `<pre>` blocks
//! (optionally `<pre><code class="language-x">`). Everything else is text, and
//! raw `&`, `<`, `>` in text are entity-escaped. Already-valid entities
//! (`&lt;`, `&gt;`, `&amp;`, `&quot;` and numeric ones) are left alone so that
//! rendering twice changes nothing.

use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;

use super::{is_valid_language, parse_fence, FENCE};

const PRE_OPEN: &str = "<pre>";
const PRE_CLOSE: &str = "</pre>";
const CODE_OPEN: &str = "<code>";
const CODE_CLOSE: &str = "</code>";
const CODE_CLASS_OPEN: &str = "<code class=\"language-";

lazy_static! {
    static ref ENTITY: Regex = Regex::new(r"^&(?:lt|gt|amp|quot|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});")
        .expect("Entity pattern should be valid");
}

/// Length of the entity starting at the beginning of `s`, if any
pub(crate) fn entity_len(s: &str) -> Option<usize> {
    ENTITY.find(s).map(|m| m.end())
}

/// Escape `&`, `<`, `>` unconditionally (for text that is never re-rendered)
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape `&`, `<`, `>` but keep `&` that already starts a valid entity
fn escape_idempotent(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        match c {
            '&' if entity_len(&s[i..]).is_some() => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape text so no part of it is read as markup or emphasis on re-rendering
pub(crate) fn escape_plain(s: &str) -> String {
    escape_idempotent(s)
        .replace('*', "&#42;")
        .replace('`', "&#96;")
}

fn code_block(lang: Option<&str>, content: &str) -> String {
    let escaped = escape_idempotent(content);
    match lang {
        Some(lang) => format!("<pre><code class=\"language-{lang}\">{escaped}</code></pre>"),
        None => format!("<pre>{escaped}</pre>"),
    }
}

/// Parse an existing `<pre>` block at the start of `text`
///
/// Returns `(language, content, bytes consumed)`.
fn parse_pre(text: &str) -> Option<(Option<&str>, &str, usize)> {
    let after = text.strip_prefix(PRE_OPEN)?;
    let close = after.find(PRE_CLOSE)?;
    let inner = &after[..close];
    let consumed = PRE_OPEN.len() + close + PRE_CLOSE.len();

    if let Some(rest) = inner.strip_prefix(CODE_CLASS_OPEN) {
        if let Some(end) = rest.find("\">") {
            let lang = &rest[..end];
            if let Some(content) = rest[end + 2..].strip_suffix(CODE_CLOSE) {
                if is_valid_language(lang) {
                    return Some((Some(lang), content, consumed));
                }
            }
        }
    }
    if let Some(content) = inner
        .strip_prefix(CODE_OPEN)
        .and_then(|rest| rest.strip_suffix(CODE_CLOSE))
    {
        return Some((None, content, consumed));
    }
    Some((None, inner, consumed))
}

/// Render text with reasoning already removed
pub(crate) fn render_body(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + body.len() / 8);
    let mut rest = body;

    loop {
        let fence_at = rest.find(FENCE);
        let pre_at = rest.find(PRE_OPEN);
        let start = match (fence_at, pre_at) {
            (Some(f), Some(p)) => f.min(p),
            (Some(f), None) => f,
            (None, Some(p)) => p,
            (None, None) => {
                out.push_str(&render_inline(rest));
                break;
            }
        };

        out.push_str(&render_inline(&rest[..start]));
        let block = &rest[start..];

        let parsed = if block.starts_with(FENCE) {
            parse_fence(block).map(|fence| (fence.lang, fence.content, fence.len))
        } else {
            parse_pre(block)
        };

        match parsed {
            Some((lang, content, consumed)) => {
                trace!("Code block: lang={:?}, {} bytes", lang, content.len());
                out.push_str(&code_block(lang, content));
                rest = &block[consumed..];
            }
            None => {
                debug!("Unterminated code block, escaping remainder as plain text");
                out.push_str(&escape_plain(block));
                break;
            }
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Italic,
}

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Code(&'a str),
    Open(Style),
    Close(Style),
    /// A `**` delimiter run
    Stars,
    /// A backtick without a partner
    Backtick,
}

fn tokenize(s: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < s.len() {
        let rest = &s[i..];
        let (token, consumed) = if rest.starts_with('`') {
            match rest[1..].find('`') {
                Some(0) | None => (Token::Backtick, 1),
                Some(end) => (Token::Code(&rest[1..1 + end]), end + 2),
            }
        } else if rest.starts_with(CODE_OPEN) {
            match rest[CODE_OPEN.len()..].find(CODE_CLOSE) {
                Some(end) => (
                    Token::Code(&rest[CODE_OPEN.len()..CODE_OPEN.len() + end]),
                    CODE_OPEN.len() + end + CODE_CLOSE.len(),
                ),
                None => {
                    i += 1;
                    continue;
                }
            }
        } else if rest.starts_with("<b>") {
            (Token::Open(Style::Bold), 3)
        } else if rest.starts_with("</b>") {
            (Token::Close(Style::Bold), 4)
        } else if rest.starts_with("<i>") {
            (Token::Open(Style::Italic), 3)
        } else if rest.starts_with("</i>") {
            (Token::Close(Style::Italic), 4)
        } else if rest.starts_with('*') {
            let run = rest.len() - rest.trim_start_matches('*').len();
            if run == 2 {
                (Token::Stars, 2)
            } else {
                i += run;
                continue;
            }
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        };

        if text_start < i {
            tokens.push(Token::Text(&s[text_start..i]));
        }
        tokens.push(token);
        i += consumed;
        text_start = i;
    }

    if text_start < s.len() {
        tokens.push(Token::Text(&s[text_start..]));
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pairing {
    Literal,
    Opening,
    Closing,
}

/// Pair openers with closers; whatever stays unpaired is emitted as literal text
fn pair(tokens: &[Token<'_>]) -> Vec<Pairing> {
    let mut roles = vec![Pairing::Literal; tokens.len()];
    let mut stack: Vec<(usize, Style)> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::Open(style) => stack.push((idx, *style)),
            Token::Close(style) => {
                if let Some(&(open, top)) = stack.last() {
                    if top == *style {
                        stack.pop();
                        roles[open] = Pairing::Opening;
                        roles[idx] = Pairing::Closing;
                    }
                }
            }
            Token::Stars => match stack.last() {
                Some(&(open, Style::Bold)) => {
                    stack.pop();
                    roles[open] = Pairing::Opening;
                    roles[idx] = Pairing::Closing;
                }
                _ => stack.push((idx, Style::Bold)),
            },
            _ => {}
        }
    }
    roles
}

fn tag(style: Style, closing: bool) -> &'static str {
    match (style, closing) {
        (Style::Bold, false) => "<b>",
        (Style::Bold, true) => "</b>",
        (Style::Italic, false) => "<i>",
        (Style::Italic, true) => "</i>",
    }
}

/// Render text outside code blocks: escape, keep balanced tags, `**x**` → `<b>x</b>`
fn render_inline(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let tokens = tokenize(s);
    let roles = pair(&tokens);
    let mut out = String::with_capacity(s.len() + 16);

    for (token, role) in tokens.iter().zip(roles) {
        match (token, role) {
            (Token::Text(text), _) => out.push_str(&escape_idempotent(text)),
            (Token::Code(code), _) => {
                out.push_str(CODE_OPEN);
                out.push_str(&escape_idempotent(code));
                out.push_str(CODE_CLOSE);
            }
            (Token::Backtick, _) => out.push_str("&#96;"),
            (Token::Open(style) | Token::Close(style), Pairing::Opening) => {
                out.push_str(tag(*style, false))
            }
            (Token::Open(style) | Token::Close(style), Pairing::Closing) => {
                out.push_str(tag(*style, true))
            }
            (Token::Stars, Pairing::Opening) => out.push_str(tag(Style::Bold, false)),
            (Token::Stars, Pairing::Closing) => out.push_str(tag(Style::Bold, true)),
            (Token::Open(style), Pairing::Literal) => {
                out.push_str(&escape_idempotent(tag(*style, false)))
            }
            (Token::Close(style), Pairing::Literal) => {
                out.push_str(&escape_idempotent(tag(*style, true)))
            }
            (Token::Stars, Pairing::Literal) => out.push_str("&#42;&#42;"),
        }
    }
    out
}
