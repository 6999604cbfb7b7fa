//! # Tarot Module
//!
//! Card catalog, prompt templates and the guided reading workflow.

pub mod deck;
pub mod prompts;
pub mod workflow;

pub use deck::{Card, Deck, Orientation};
pub use workflow::{CardReading, Reading, SpreadKind, WorkflowEngine, WorkflowState};
