//! Transport-size chunking of already-rendered text.
//!
//! The rendered text is parsed back into atoms: escape pairs, entities and
//! tags are indivisible units, while code spans, code blocks and emphasis
//! spans are wrapped groups. Chunks break between atoms, preferring the last
//! top-level newline. A group that cannot fit in one chunk is split into
//! several pieces, each closed and reopened with its own delimiters.

use log::trace;

use super::html::entity_len;
use super::Dialect;

/// Smallest accepted chunk size; leaves room for delimiters of split groups
pub const MIN_CHUNK_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Unit(String),
    Wrapped {
        open: String,
        close: String,
        inner: Vec<Atom>,
    },
}

impl Atom {
    fn unit(s: &str) -> Self {
        Atom::Unit(s.to_string())
    }

    fn char_len(&self) -> usize {
        match self {
            Atom::Unit(s) => s.chars().count(),
            Atom::Wrapped { open, close, inner } => {
                open.chars().count()
                    + close.chars().count()
                    + inner.iter().map(Atom::char_len).sum::<usize>()
            }
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Atom::Unit(s) => out.push_str(s),
            Atom::Wrapped { open, close, inner } => {
                out.push_str(open);
                for atom in inner {
                    atom.write_to(out);
                }
                out.push_str(close);
            }
        }
    }

    fn is_newline(&self) -> bool {
        matches!(self, Atom::Unit(s) if s == "\n")
    }
}

/// Split rendered `text` into pieces of at most `max_chars` characters
///
/// `max_chars` is raised to [`MIN_CHUNK_CHARS`] if smaller. Each chunk is
/// valid markup on its own. Whitespace-only chunks are dropped.
pub fn chunk_rendered(text: &str, dialect: Dialect, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(MIN_CHUNK_CHARS);
    if text.chars().count() <= max_chars {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let atoms = match dialect {
        Dialect::Html => parse_html(text),
        Dialect::MarkdownV2 => parse_markdown(text),
    };
    let chunks: Vec<String> = pack(&atoms, max_chars)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect();
    trace!("Split {} chars into {} chunks", text.chars().count(), chunks.len());
    chunks
}

/// Split plain text (no markup) into pieces of at most `max_chars` characters
pub fn chunk_plain(text: &str, max_chars: usize) -> Vec<String> {
    let atoms: Vec<Atom> = text
        .char_indices()
        .map(|(i, c)| Atom::unit(&text[i..i + c.len_utf8()]))
        .collect();
    pack(&atoms, max_chars.max(MIN_CHUNK_CHARS))
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

/// Greedy packer that accumulates atoms into chunks of at most `max` chars
struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
    /// Byte offset and char count of the last top-level newline in `current`
    last_break: Option<(usize, usize)>,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
            last_break: None,
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
        self.current_len = 0;
        self.last_break = None;
    }

    /// Emit `current` up to its last newline, keeping what follows
    fn flush_at_break(&mut self) {
        match self.last_break.take() {
            Some((byte, chars)) if byte > 0 => {
                let rest = self.current.split_off(byte);
                self.chunks.push(std::mem::take(&mut self.current));
                self.current = rest.strip_prefix('\n').unwrap_or(rest.as_str()).to_string();
                self.current_len -= chars + 1;
            }
            _ => self.flush(),
        }
    }

    fn push_str(&mut self, s: &str, len: usize) {
        self.current.push_str(s);
        self.current_len += len;
    }

    fn push(&mut self, atom: &Atom) {
        let len = atom.char_len();

        if self.current_len + len > self.max {
            self.flush_at_break();
            if self.current_len + len > self.max {
                self.flush();
            }
        }

        if len <= self.max {
            if atom.is_newline() {
                self.last_break = Some((self.current.len(), self.current_len));
            }
            let mut rendered = String::new();
            atom.write_to(&mut rendered);
            self.push_str(&rendered, len);
            return;
        }

        match atom {
            Atom::Wrapped { open, close, inner } => {
                let overhead = open.chars().count() + close.chars().count();
                let budget = self.max.saturating_sub(overhead).max(1);
                let pieces = pack(inner, budget);
                let last = pieces.len().saturating_sub(1);
                for (idx, piece) in pieces.into_iter().enumerate() {
                    let wrapped = format!("{open}{piece}{close}");
                    let wrapped_len = wrapped.chars().count();
                    self.push_str(&wrapped, wrapped_len);
                    if idx < last {
                        self.flush();
                    }
                }
            }
            Atom::Unit(s) => {
                // Units are at most a few chars; only a tiny max gets here
                self.push_str(s, len);
                self.flush();
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

fn pack(atoms: &[Atom], max: usize) -> Vec<String> {
    let mut packer = Packer::new(max);
    for atom in atoms {
        packer.push(atom);
    }
    packer.finish()
}

/// Units for entity-escaped code content
fn html_units(s: &str) -> Vec<Atom> {
    let mut atoms = Vec::new();
    let mut i = 0;
    while i < s.len() {
        let rest = &s[i..];
        let len = if rest.starts_with('&') {
            entity_len(rest).unwrap_or(1)
        } else {
            rest.chars().next().map_or(1, char::len_utf8)
        };
        atoms.push(Atom::unit(&rest[..len]));
        i += len;
    }
    atoms
}

/// Byte offset of the `</tag>` matching an already consumed `<tag>`
fn find_matching_close(s: &str, open: &str, close: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = 0;
    while i < s.len() {
        let rest = &s[i..];
        if rest.starts_with(close) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += close.len();
        } else if rest.starts_with(open) {
            depth += 1;
            i += open.len();
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

fn parse_html(s: &str) -> Vec<Atom> {
    let mut atoms = Vec::new();
    let mut i = 0;

    while i < s.len() {
        let rest = &s[i..];

        if let Some(after) = rest.strip_prefix("<pre>") {
            if let Some(end) = after.find("</pre>") {
                let inner = &after[..end];
                let (open, close, content) = match inner.find('>') {
                    Some(gt) if inner.starts_with("<code") && inner.ends_with("</code>") => (
                        format!("<pre>{}", &inner[..=gt]),
                        "</code></pre>".to_string(),
                        &inner[gt + 1..inner.len() - "</code>".len()],
                    ),
                    _ => ("<pre>".to_string(), "</pre>".to_string(), inner),
                };
                atoms.push(Atom::Wrapped {
                    open,
                    close,
                    inner: html_units(content),
                });
                i += "<pre>".len() + end + "</pre>".len();
                continue;
            }
        }

        if let Some(after) = rest.strip_prefix("<code>") {
            if let Some(end) = after.find("</code>") {
                atoms.push(Atom::Wrapped {
                    open: "<code>".to_string(),
                    close: "</code>".to_string(),
                    inner: html_units(&after[..end]),
                });
                i += "<code>".len() + end + "</code>".len();
                continue;
            }
        }

        let styled = [("<b>", "</b>"), ("<i>", "</i>")]
            .into_iter()
            .find(|(open, _)| rest.starts_with(open));
        if let Some((open, close)) = styled {
            let after = &rest[open.len()..];
            if let Some(end) = find_matching_close(after, open, close) {
                atoms.push(Atom::Wrapped {
                    open: open.to_string(),
                    close: close.to_string(),
                    inner: parse_html(&after[..end]),
                });
                i += open.len() + end + close.len();
                continue;
            }
        }

        let len = if rest.starts_with('&') {
            entity_len(rest).unwrap_or(1)
        } else if rest.starts_with('<') {
            rest.find('>').map_or(1, |gt| gt + 1)
        } else {
            rest.chars().next().map_or(1, char::len_utf8)
        };
        atoms.push(Atom::unit(&rest[..len]));
        i += len;
    }
    atoms
}

/// Length of the unit at the start of MarkdownV2 text: an escape pair or one char
fn markdown_unit_len(s: &str) -> usize {
    let mut chars = s.chars();
    match chars.next() {
        Some('\\') => 1 + chars.next().map_or(0, char::len_utf8),
        Some(c) => c.len_utf8(),
        None => 0,
    }
}

fn markdown_units(s: &str) -> Vec<Atom> {
    let mut atoms = Vec::new();
    let mut i = 0;
    while i < s.len() {
        let len = markdown_unit_len(&s[i..]);
        atoms.push(Atom::unit(&s[i..i + len]));
        i += len;
    }
    atoms
}

/// Byte offset of the next unescaped `delim`, skipping inline code when asked
fn find_unescaped(s: &str, delim: char, skip_code: bool) -> Option<usize> {
    let mut i = 0;
    while i < s.len() {
        let rest = &s[i..];
        match rest.chars().next() {
            Some(c) if c == delim => return Some(i),
            Some('`') if skip_code => {
                let end = find_unescaped(&rest[1..], '`', false)?;
                i += end + 2;
            }
            _ => i += markdown_unit_len(rest),
        }
    }
    None
}

fn parse_markdown(s: &str) -> Vec<Atom> {
    let mut atoms = Vec::new();
    let mut i = 0;

    while i < s.len() {
        let rest = &s[i..];

        if let Some(after) = rest.strip_prefix("```") {
            if let Some(end) = after.find("```") {
                let inner = &after[..end];
                let (open, content) = match inner.find('\n') {
                    Some(nl) => (format!("```{}", &inner[..=nl]), &inner[nl + 1..]),
                    None => ("```".to_string(), inner),
                };
                atoms.push(Atom::Wrapped {
                    open,
                    close: "```".to_string(),
                    inner: markdown_units(content),
                });
                i += 3 + end + 3;
                continue;
            }
        }

        if let Some(after) = rest.strip_prefix('`') {
            if let Some(end) = find_unescaped(after, '`', false) {
                atoms.push(Atom::Wrapped {
                    open: "`".to_string(),
                    close: "`".to_string(),
                    inner: markdown_units(&after[..end]),
                });
                i += end + 2;
                continue;
            }
        }

        if let Some(after) = rest.strip_prefix('*') {
            if let Some(end) = find_unescaped(after, '*', true) {
                atoms.push(Atom::Wrapped {
                    open: "*".to_string(),
                    close: "*".to_string(),
                    inner: parse_markdown(&after[..end]),
                });
                i += end + 2;
                continue;
            }
        }

        let len = markdown_unit_len(rest);
        atoms.push(Atom::unit(&rest[..len]));
        i += len;
    }
    atoms
}
