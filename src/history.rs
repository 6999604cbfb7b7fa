//! # Conversation History Module
//!
//! Per-user bounded log of user/assistant turn pairs used as context for the
//! plain chat path. Pairs are appended atomically and evicted oldest-first,
//! so the log never holds a user turn without its reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::llm::{ChatMessage, Role};
use crate::render::html::escape_text;

/// Telegram chat identifier used as the per-user key
pub type UserId = i64;

/// A single user or assistant turn
pub type ConversationTurn = ChatMessage;

/// Bounded per-user conversation history
#[derive(Debug)]
pub struct HistoryStore {
    max_pairs: usize,
    conversations: Mutex<HashMap<UserId, VecDeque<ConversationTurn>>>,
}

impl HistoryStore {
    pub fn new(max_pairs: usize) -> Self {
        Self {
            max_pairs: max_pairs.max(1),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, VecDeque<ConversationTurn>>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_pairs(&self) -> usize {
        self.max_pairs
    }

    /// Record a completed exchange, evicting the oldest pairs beyond the bound
    pub fn append(&self, user_id: UserId, user_text: &str, assistant_text: &str) {
        let mut conversations = self.lock();
        let turns = conversations.entry(user_id).or_default();
        turns.push_back(ChatMessage::user(user_text));
        turns.push_back(ChatMessage::assistant(assistant_text));

        while turns.len() > 2 * self.max_pairs {
            turns.pop_front();
            turns.pop_front();
        }
    }

    /// Turns for `user_id`, oldest first
    pub fn get(&self, user_id: UserId) -> Vec<ConversationTurn> {
        self.lock()
            .get(&user_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, user_id: UserId) {
        self.lock().remove(&user_id);
    }

    /// Transcript of the user's history as HTML-escaped literal text
    ///
    /// Role labels are wrapped in `<b>`; turn content is escaped so that it
    /// always shows verbatim. Returns an empty string when nothing is recorded.
    pub fn render_readable(&self, user_id: UserId, user_label: &str, assistant_label: &str) -> String {
        self.get(user_id)
            .iter()
            .map(|turn| {
                let label = match turn.role {
                    Role::User => user_label,
                    _ => assistant_label,
                };
                format!("<b>{}</b>\n{}", escape_text(label), escape_text(&turn.content))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unknown_user_is_empty() {
        let store = HistoryStore::new(5);
        assert!(store.get(1).is_empty());
    }

    #[test]
    fn test_zero_bound_is_clamped() {
        let store = HistoryStore::new(0);
        store.append(1, "q", "a");
        assert_eq!(store.get(1).len(), 2);
        assert_eq!(store.max_pairs(), 1);
    }

    #[test]
    fn test_render_readable_escapes_markup() {
        let store = HistoryStore::new(5);
        store.append(7, "<b>bold?</b> & more", "use `x < y`");
        let transcript = store.render_readable(7, "You", "Bot");
        assert_eq!(
            transcript,
            "<b>You</b>\n&lt;b&gt;bold?&lt;/b&gt; &amp; more\n\n<b>Bot</b>\nuse `x &lt; y`"
        );
    }

    #[test]
    fn test_render_readable_empty() {
        let store = HistoryStore::new(5);
        assert_eq!(store.render_readable(7, "You", "Bot"), "");
    }
}
