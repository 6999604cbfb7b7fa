//! # Reading Workflow Module
//!
//! Per-user state machine for a guided tarot reading:
//!
//! ```text
//! (none) -> AwaitingQuestion -> AwaitingSpreadChoice -> AwaitingSelection -> Interpreting -> (none)
//! ```
//!
//! `cancel` removes the session from any state. A session left idle longer
//! than the configured TTL is treated as absent, except while interpretation
//! is running.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{BackendError, WorkflowError};
use crate::history::UserId;
use crate::llm::ChatMessage;

use super::deck::{Card, Deck, DECK_SIZE};
use super::prompts;

/// Longest accepted question, in characters
pub const MAX_QUESTION_CHARS: usize = 500;

/// Observable state of an active reading session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowState {
    AwaitingQuestion,
    AwaitingSpreadChoice,
    AwaitingSelection,
    Interpreting,
}

/// Card layout of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpreadKind {
    Single,
    Three,
    CelticCross,
}

impl SpreadKind {
    pub const ALL: [SpreadKind; 3] = [SpreadKind::Single, SpreadKind::Three, SpreadKind::CelticCross];

    pub fn draw_count(self) -> usize {
        match self {
            SpreadKind::Single => 1,
            SpreadKind::Three => 3,
            SpreadKind::CelticCross => 10,
        }
    }

    /// Position meaning of each drawn card
    pub fn positions(self) -> &'static [&'static str] {
        prompts::positions(self)
    }

    /// Stable identifier used in callback data
    pub fn as_str(self) -> &'static str {
        match self {
            SpreadKind::Single => "single",
            SpreadKind::Three => "three",
            SpreadKind::CelticCross => "celtic",
        }
    }
}

impl FromStr for SpreadKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "1" | "單張" => Ok(SpreadKind::Single),
            "three" | "3" | "三張" => Ok(SpreadKind::Three),
            "celtic" | "celtic cross" | "10" | "凱爾特十字" => Ok(SpreadKind::CelticCross),
            other => Err(WorkflowError::UnsupportedSpread(other.to_string())),
        }
    }
}

/// Interpretation of one drawn card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardReading {
    pub card: Card,
    pub position: String,
    pub interpretation: String,
}

/// A completed reading, cards in selection order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub question: String,
    pub spread: SpreadKind,
    pub cards: Vec<CardReading>,
    pub overall: String,
}

/// Session data carried by each state
#[derive(Debug)]
enum Stage {
    AwaitingQuestion,
    AwaitingSpreadChoice {
        question: String,
        deck: Deck,
    },
    AwaitingSelection {
        question: String,
        deck: Deck,
        spread: SpreadKind,
    },
    Interpreting,
}

impl Stage {
    fn state(&self) -> WorkflowState {
        match self {
            Stage::AwaitingQuestion => WorkflowState::AwaitingQuestion,
            Stage::AwaitingSpreadChoice { .. } => WorkflowState::AwaitingSpreadChoice,
            Stage::AwaitingSelection { .. } => WorkflowState::AwaitingSelection,
            Stage::Interpreting => WorkflowState::Interpreting,
        }
    }
}

#[derive(Debug)]
struct WorkflowSession {
    stage: Stage,
    updated_at: DateTime<Utc>,
    /// Set by `cancel`; checked between interpretation calls
    cancelled: Arc<AtomicBool>,
}

impl WorkflowSession {
    fn new() -> Self {
        Self {
            stage: Stage::AwaitingQuestion,
            updated_at: Utc::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !matches!(self.stage, Stage::Interpreting) && now - self.updated_at >= ttl
    }

    fn advance(&mut self, stage: Stage) -> WorkflowState {
        self.stage = stage;
        self.updated_at = Utc::now();
        self.stage.state()
    }
}

type Sessions = HashMap<UserId, WorkflowSession>;

/// Owner of every user's reading session
#[derive(Debug)]
pub struct WorkflowEngine {
    sessions: Mutex<Sessions>,
    ttl: Duration,
    image_base_url: String,
}

impl WorkflowEngine {
    pub fn new(ttl: Duration, image_base_url: impl Into<String>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            image_base_url: image_base_url.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The user's session if present and not expired; expired ones are dropped
    fn live_session(
        sessions: &mut Sessions,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<&mut WorkflowSession, WorkflowError> {
        let expired = sessions
            .get(&user_id)
            .is_some_and(|session| session.is_expired(Utc::now(), ttl));
        if expired {
            debug!(user_id = %user_id, "Dropping expired reading session");
            sessions.remove(&user_id);
        }
        sessions
            .get_mut(&user_id)
            .ok_or(WorkflowError::NoActiveSession)
    }

    /// Begin a reading
    pub fn start(&self, user_id: UserId) -> Result<WorkflowState, WorkflowError> {
        let mut sessions = self.lock();
        if Self::live_session(&mut sessions, user_id, self.ttl).is_ok() {
            return Err(WorkflowError::AlreadyActive);
        }
        sessions.insert(user_id, WorkflowSession::new());
        info!(user_id = %user_id, "Reading session started");
        Ok(WorkflowState::AwaitingQuestion)
    }

    /// Store the question and shuffle a fresh deck
    pub fn submit_question(&self, user_id: UserId, text: &str) -> Result<WorkflowState, WorkflowError> {
        self.submit_question_with_rng(user_id, text, &mut rand::thread_rng())
    }

    /// [`submit_question`](Self::submit_question) with a caller-provided RNG
    pub fn submit_question_with_rng<R: Rng + ?Sized>(
        &self,
        user_id: UserId,
        text: &str,
        rng: &mut R,
    ) -> Result<WorkflowState, WorkflowError> {
        let mut sessions = self.lock();
        let session = Self::live_session(&mut sessions, user_id, self.ttl)?;
        if !matches!(session.stage, Stage::AwaitingQuestion) {
            return Err(WorkflowError::UnexpectedInput {
                state: session.stage.state(),
            });
        }

        let question = text.trim();
        if question.is_empty() {
            return Err(WorkflowError::InvalidQuestion("empty"));
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(WorkflowError::InvalidQuestion("too long"));
        }

        let deck = Deck::shuffled_with(&self.image_base_url, rng);
        debug!(user_id = %user_id, question_chars = question.chars().count(), "Question accepted, deck shuffled");
        Ok(session.advance(Stage::AwaitingSpreadChoice {
            question: question.to_string(),
            deck,
        }))
    }

    /// Choose the spread, fixing how many cards will be drawn
    pub fn select_spread(&self, user_id: UserId, spread: SpreadKind) -> Result<WorkflowState, WorkflowError> {
        let mut sessions = self.lock();
        let session = Self::live_session(&mut sessions, user_id, self.ttl)?;

        match std::mem::replace(&mut session.stage, Stage::Interpreting) {
            Stage::AwaitingSpreadChoice { question, deck } => {
                debug!(user_id = %user_id, spread = spread.as_str(), "Spread selected");
                Ok(session.advance(Stage::AwaitingSelection {
                    question,
                    deck,
                    spread,
                }))
            }
            other => {
                let state = other.state();
                session.stage = other;
                Err(WorkflowError::UnexpectedInput { state })
            }
        }
    }

    /// Draw the selected cards and interpret them one call at a time
    ///
    /// `raw` holds whitespace-separated positions in `1..=78`, exactly one per
    /// card of the chosen spread and all distinct. A malformed selection is
    /// rejected without touching the session. Once accepted, `interpret` is
    /// awaited once per card in selection order and then once for the overall
    /// reading. The session is removed when the reading ends, fails or is
    /// cancelled.
    pub async fn submit_selection<F, Fut>(
        &self,
        user_id: UserId,
        raw: &str,
        mut interpret: F,
    ) -> Result<Reading, WorkflowError>
    where
        F: FnMut(Vec<ChatMessage>) -> Fut,
        Fut: Future<Output = Result<String, BackendError>>,
    {
        let (question, spread, cards, cancelled) = {
            let mut sessions = self.lock();
            let session = Self::live_session(&mut sessions, user_id, self.ttl)?;

            let Stage::AwaitingSelection { deck, spread, .. } = &session.stage else {
                return Err(WorkflowError::UnexpectedInput {
                    state: session.stage.state(),
                });
            };
            let spread = *spread;
            let positions = parse_selection(raw, spread.draw_count())?;
            let cards: Vec<Card> = positions
                .iter()
                .filter_map(|&position| deck.draw(position).cloned())
                .collect();

            let question = match std::mem::replace(&mut session.stage, Stage::Interpreting) {
                Stage::AwaitingSelection { question, .. } => question,
                _ => String::new(),
            };
            session.updated_at = Utc::now();
            (question, spread, cards, Arc::clone(&session.cancelled))
        };

        info!(
            user_id = %user_id,
            spread = spread.as_str(),
            cards = cards.len(),
            "Interpreting reading"
        );

        let calls = prompts::reading_messages(&question, spread, &cards);
        let mut interpretations = Vec::with_capacity(calls.len());
        for (step, messages) in calls.into_iter().enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                info!(user_id = %user_id, step, "Reading cancelled during interpretation");
                return Err(WorkflowError::Cancelled);
            }
            match interpret(messages).await {
                Ok(text) => interpretations.push(text),
                Err(e) => {
                    warn!(user_id = %user_id, step, error = %e, "Interpretation call failed, discarding session");
                    self.finish(user_id, &cancelled);
                    return Err(e.into());
                }
            }
        }

        if cancelled.load(Ordering::SeqCst) {
            info!(user_id = %user_id, "Reading cancelled before delivery");
            return Err(WorkflowError::Cancelled);
        }
        self.finish(user_id, &cancelled);

        let overall = interpretations.pop().unwrap_or_default();
        let card_readings = cards
            .into_iter()
            .zip(spread.positions())
            .zip(interpretations)
            .map(|((card, position), interpretation)| CardReading {
                card,
                position: (*position).to_string(),
                interpretation,
            })
            .collect();

        info!(user_id = %user_id, "Reading completed");
        Ok(Reading {
            question,
            spread,
            cards: card_readings,
            overall,
        })
    }

    /// Remove the session only if it is still the one that ran this reading
    fn finish(&self, user_id: UserId, token: &Arc<AtomicBool>) {
        let mut sessions = self.lock();
        if sessions
            .get(&user_id)
            .is_some_and(|session| Arc::ptr_eq(&session.cancelled, token))
        {
            sessions.remove(&user_id);
        }
    }

    /// Abandon the user's reading; returns whether a session existed
    pub fn cancel(&self, user_id: UserId) -> bool {
        match self.lock().remove(&user_id) {
            Some(session) => {
                session.cancelled.store(true, Ordering::SeqCst);
                info!(user_id = %user_id, state = ?session.stage.state(), "Reading session cancelled");
                true
            }
            None => false,
        }
    }

    pub fn current_state(&self, user_id: UserId) -> Option<WorkflowState> {
        let mut sessions = self.lock();
        Self::live_session(&mut sessions, user_id, self.ttl)
            .ok()
            .map(|session| session.stage.state())
    }

    /// Spread chosen for the user's reading, once selected
    pub fn current_spread(&self, user_id: UserId) -> Option<SpreadKind> {
        let mut sessions = self.lock();
        match Self::live_session(&mut sessions, user_id, self.ttl).ok()?.stage {
            Stage::AwaitingSelection { spread, .. } => Some(spread),
            _ => None,
        }
    }

    /// Drop every expired session; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.ttl));
        let purged = before - sessions.len();
        if purged > 0 {
            info!(purged, "Purged expired reading sessions");
        }
        purged
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }
}

/// Parse `count` distinct draw positions in `1..=78`
pub fn parse_selection(raw: &str, count: usize) -> Result<Vec<usize>, WorkflowError> {
    let mut positions = Vec::with_capacity(count);
    for part in raw
        .split(|c: char| c.is_whitespace() || c == ',' || c == '，')
        .filter(|part| !part.is_empty())
    {
        let position: usize = part
            .parse()
            .map_err(|_| WorkflowError::InvalidSelection(format!("'{part}' is not a number")))?;
        if !(1..=DECK_SIZE).contains(&position) {
            return Err(WorkflowError::InvalidSelection(format!(
                "{position} is outside 1-{DECK_SIZE}"
            )));
        }
        if positions.contains(&position) {
            return Err(WorkflowError::InvalidSelection(format!(
                "{position} was chosen more than once"
            )));
        }
        positions.push(position);
    }

    if positions.len() != count {
        return Err(WorkflowError::InvalidSelection(format!(
            "expected {count} numbers, got {}",
            positions.len()
        )));
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("7 23 45", 3).unwrap(), vec![7, 23, 45]);
        assert_eq!(parse_selection(" 7,23，45 ", 3).unwrap(), vec![7, 23, 45]);
        assert!(parse_selection("7 23", 3).is_err());
        assert!(parse_selection("0", 1).is_err());
        assert!(parse_selection("79", 1).is_err());
        assert!(parse_selection("-3", 1).is_err());
        assert!(parse_selection("abc", 1).is_err());
        assert!(matches!(
            parse_selection("5 5 12", 3),
            Err(WorkflowError::InvalidSelection(msg)) if msg.contains("more than once")
        ));
    }

    #[test]
    fn test_spread_from_str() {
        assert_eq!("Three".parse::<SpreadKind>().unwrap(), SpreadKind::Three);
        assert_eq!("10".parse::<SpreadKind>().unwrap(), SpreadKind::CelticCross);
        assert_eq!(
            "pentagram".parse::<SpreadKind>(),
            Err(WorkflowError::UnsupportedSpread("pentagram".to_string()))
        );
        for spread in SpreadKind::ALL {
            assert_eq!(spread.as_str().parse::<SpreadKind>().unwrap(), spread);
        }
    }

    #[test]
    fn test_interpreting_never_expires() {
        let mut session = WorkflowSession::new();
        session.stage = Stage::Interpreting;
        assert!(!session.is_expired(Utc::now() + Duration::days(1), Duration::minutes(1)));
        session.stage = Stage::AwaitingQuestion;
        assert!(session.is_expired(Utc::now() + Duration::days(1), Duration::minutes(1)));
    }
}
