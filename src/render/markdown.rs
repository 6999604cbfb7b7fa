//! Telegram MarkdownV2 dialect.
//!
//! Outside code every character of [`SPECIAL`] is backslash-escaped. A
//! backslash that already escapes a special character (or another backslash)
//! is kept as is, which makes escaping idempotent. `**bold**` becomes
//! `*bold*`, padded with spaces so the delimiter never touches neighbouring
//! text, including a following code block or escaped tail. Inside code only
//! `\` and `` ` `` are escaped, as the format requires.
//!
//! Only runs of one or two stars can delimit emphasis. Longer runs such as
//! `***x***` are escaped star by star and render without emphasis; nested
//! bold-italic is not supported.

use log::{debug, trace};

use super::{parse_fence, FENCE};

/// Characters that must be escaped outside code
pub const SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

fn is_escapable(c: char) -> bool {
    c == '\\' || SPECIAL.contains(&c)
}

/// Escape every special character, keeping existing escape pairs
pub(crate) fn escape_plain(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next) if is_escapable(next) => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                _ => out.push_str("\\\\"),
            },
            c if SPECIAL.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape `\` and `` ` `` inside code, keeping existing `\\` and `` \` `` pairs
fn escape_code(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next) if next == '\\' || next == '`' => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
                _ => out.push_str("\\\\"),
            },
            '`' => out.push_str("\\`"),
            c => out.push(c),
        }
    }
    out
}

/// Byte offset of the first "```" that is not part of an escape pair
fn find_fence(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                // Skip the escaped character; continuation bytes never match ASCII
                i += 2;
            }
            b'`' if s[i..].starts_with(FENCE) => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn code_block(lang: Option<&str>, content: &str) -> String {
    format!("{FENCE}{}\n{}{FENCE}", lang.unwrap_or(""), escape_code(content))
}

/// Render text with reasoning already removed, followed by `tail` (an
/// unterminated reasoning block) as plain escaped text
pub(crate) fn render_body(body: &str, tail: Option<&str>) -> String {
    let mut out = String::with_capacity(body.len() + body.len() / 4);
    let mut pad_next = false;
    let mut rest = body;

    while let Some(start) = find_fence(rest) {
        render_inline(&rest[..start], &mut out, &mut pad_next);
        let block = &rest[start..];
        match parse_fence(block) {
            Some(fence) => {
                trace!("Code block: lang={:?}, {} bytes", fence.lang, fence.content.len());
                push_piece(&mut out, &code_block(fence.lang, fence.content), &mut pad_next);
                rest = &block[fence.len..];
            }
            None => {
                debug!("Unterminated code block, escaping remainder as plain text");
                push_piece(&mut out, &escape_plain(block), &mut pad_next);
                rest = "";
                break;
            }
        }
    }
    render_inline(rest, &mut out, &mut pad_next);

    if let Some(tail) = tail {
        push_piece(&mut out, &escape_plain(tail), &mut pad_next);
    }
    out
}

/// Append `piece`, first inserting the space owed to a closing `*`
fn push_piece(out: &mut String, piece: &str, pad_next: &mut bool) {
    if piece.is_empty() {
        return;
    }
    if std::mem::take(pad_next) && piece.chars().next().is_some_and(|c| !c.is_whitespace()) {
        out.push(' ');
    }
    out.push_str(piece);
}

#[derive(Debug)]
enum Token<'a> {
    /// Text to be escaped
    Text(&'a str),
    /// An existing escape pair, kept verbatim
    Escaped(&'a str),
    /// Backslash not followed by an escapable character
    LoneBackslash,
    Code(&'a str),
    /// Unescaped run of `*`
    Stars {
        len: usize,
        can_open: bool,
        can_close: bool,
    },
    /// Backtick without a partner
    Backtick,
}

fn tokenize(s: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < s.len() {
        let rest = &s[i..];
        let (token, consumed) = if rest.starts_with('\\') {
            match rest[1..].chars().next() {
                Some(next) if is_escapable(next) => (Token::Escaped(&rest[..1 + next.len_utf8()]), 1 + next.len_utf8()),
                _ => (Token::LoneBackslash, 1),
            }
        } else if rest.starts_with('`') {
            match rest[1..].find('`') {
                Some(0) | None => (Token::Backtick, 1),
                Some(end) => (Token::Code(&rest[1..1 + end]), end + 2),
            }
        } else if rest.starts_with('*') {
            let len = rest.len() - rest.trim_start_matches('*').len();
            let prev = s[..i].chars().next_back();
            let next = rest[len..].chars().next();
            (
                Token::Stars {
                    len,
                    can_open: next.is_some_and(|c| !c.is_whitespace()),
                    can_close: prev.is_some_and(|c| !c.is_whitespace()),
                },
                len,
            )
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

/// Single-level emphasis pairing: a run of one or two stars opens, the next
/// run of the same length that can close ends it. Runs seen while an
/// emphasis is open, and an opener that never closes, stay literal.
fn pair(tokens: &[Token<'_>]) -> Vec<Pairing> {
    let mut roles = vec![Pairing::Literal; tokens.len()];
    let mut open: Option<(usize, usize)> = None;

    for (idx, token) in tokens.iter().enumerate() {
        let Token::Stars {
            len,
            can_open,
            can_close,
        } = *token
        else {
            continue;
        };
        match open {
            Some((open_idx, open_len)) if open_len == len && can_close => {
                roles[open_idx] = Pairing::Opening;
                roles[idx] = Pairing::Closing;
                open = None;
            }
            Some(_) => {}
            None if can_open && (len == 1 || len == 2) => open = Some((idx, len)),
            None => {}
        }
    }
    roles
}

/// Render text outside code blocks onto `out`. `pad_next` carries a pending
/// space after a closing `*` across calls.
fn render_inline(s: &str, out: &mut String, pad_next: &mut bool) {
    let tokens = tokenize(s);
    let roles = pair(&tokens);

    for (token, role) in tokens.iter().zip(roles) {
        let piece = match (token, role) {
            (Token::Text(text), _) => escape_plain(text),
            (Token::Escaped(pair), _) => (*pair).to_string(),
            (Token::LoneBackslash, _) => "\\\\".to_string(),
            (Token::Code(code), _) => format!("`{}`", escape_code(code)),
            (Token::Backtick, _) => "\\`".to_string(),
            (Token::Stars { .. }, Pairing::Opening) => {
                *pad_next = false;
                if out.chars().next_back().is_some_and(|c| !c.is_whitespace()) {
                    out.push(' ');
                }
                "*".to_string()
            }
            (Token::Stars { .. }, Pairing::Closing) => {
                out.push('*');
                *pad_next = true;
                continue;
            }
            (Token::Stars { len, .. }, Pairing::Literal) => "\\*".repeat(*len),
        };
        push_piece(out, &piece, pad_next);
    }
}
