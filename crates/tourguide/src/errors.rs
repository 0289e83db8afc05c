use std::time::Duration;
use thiserror::Error;

/// Errors produced by the walkthrough engine.
///
/// All of these are absorbed at the engine boundary: a failed wait or a
/// refused transition is logged and the tour stays where it was. Nothing in
/// this crate panics on the host's behalf.
#[derive(Debug, Error)]
pub enum TourError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out after {timeout:?} waiting for {selector}")]
    Timeout { timeout: Duration, selector: String },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("wait canceled: {0}")]
    Canceled(String),

    /// The tour already reached a terminal state; navigation is refused.
    #[error("tour is no longer active")]
    NotActive,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("unknown step id: {0}")]
    UnknownStep(String),
}
