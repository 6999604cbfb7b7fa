//! # Error Types Module
//!
//! This module defines the error types used by the reading workflow, the model
//! selector and the language-model backend client.

use crate::tarot::workflow::WorkflowState;

/// Errors raised by the guided reading workflow
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// A reading session already exists for this user
    AlreadyActive,
    /// The user has no reading session
    NoActiveSession,
    /// The operation is not valid in the session's current state
    UnexpectedInput { state: WorkflowState },
    /// The question was rejected (empty or too long)
    InvalidQuestion(&'static str),
    /// The card selection was rejected; the session is left untouched
    InvalidSelection(String),
    /// The chosen spread cannot be drawn
    UnsupportedSpread(String),
    /// An interpretation call failed; the session has been discarded
    InterpretationFailed(String),
    /// The reading was cancelled while interpretations were running
    Cancelled,
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowError::AlreadyActive => write!(f, "A reading is already in progress"),
            WorkflowError::NoActiveSession => write!(f, "No active reading session"),
            WorkflowError::UnexpectedInput { state } => {
                write!(f, "Input not accepted in state {state:?}")
            }
            WorkflowError::InvalidQuestion(reason) => write!(f, "Invalid question: {reason}"),
            WorkflowError::InvalidSelection(msg) => write!(f, "Invalid selection: {msg}"),
            WorkflowError::UnsupportedSpread(kind) => write!(f, "Unsupported spread: {kind}"),
            WorkflowError::InterpretationFailed(msg) => {
                write!(f, "Interpretation failed: {msg}")
            }
            WorkflowError::Cancelled => write!(f, "Reading cancelled"),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// Errors raised by the model selector
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The requested model is not in the configured allow-list
    UnknownModel(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::UnknownModel(name) => write!(f, "Unknown model: {name}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Classification of backend failures, used for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection failures - retryable
    Network,
    /// Request exceeded the per-attempt timeout - retryable
    Timeout,
    /// HTTP 429 - retryable with backoff
    RateLimited,
    /// HTTP 5xx - retryable
    Server,
    /// HTTP 401/403 - not retryable
    Auth,
    /// Unexpected status or unparseable body - not retryable
    InvalidResponse,
    /// The circuit breaker is open, the call was not attempted
    CircuitOpen,
}

/// Opaque upstream failure from a language-model backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Network
                | BackendErrorKind::Timeout
                | BackendErrorKind::RateLimited
                | BackendErrorKind::Server
        )
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            BackendErrorKind::Network => write!(f, "Network error: {}", self.message),
            BackendErrorKind::Timeout => write!(f, "Timeout error: {}", self.message),
            BackendErrorKind::RateLimited => write!(f, "Rate limited: {}", self.message),
            BackendErrorKind::Server => write!(f, "Server error: {}", self.message),
            BackendErrorKind::Auth => write!(f, "Authentication error: {}", self.message),
            BackendErrorKind::InvalidResponse => write!(f, "Invalid response: {}", self.message),
            BackendErrorKind::CircuitOpen => write!(f, "Circuit open: {}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for WorkflowError {
    fn from(err: BackendError) -> Self {
        WorkflowError::InterpretationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_retryable() {
        assert!(BackendError::new(BackendErrorKind::Network, "x").is_retryable());
        assert!(BackendError::new(BackendErrorKind::RateLimited, "x").is_retryable());
        assert!(!BackendError::new(BackendErrorKind::Auth, "x").is_retryable());
        assert!(!BackendError::new(BackendErrorKind::CircuitOpen, "x").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::new(BackendErrorKind::Timeout, "60s elapsed");
        assert_eq!(err.to_string(), "Timeout error: 60s elapsed");

        let err = ModelError::UnknownModel("gpt-x".to_string());
        assert_eq!(err.to_string(), "Unknown model: gpt-x");
    }

    #[test]
    fn test_backend_error_converts_to_interpretation_failed() {
        let err: WorkflowError = BackendError::new(BackendErrorKind::Server, "502").into();
        assert_eq!(
            err,
            WorkflowError::InterpretationFailed("Server error: 502".to_string())
        );
    }
}
