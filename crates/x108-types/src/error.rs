// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for the X-108 gate and its collaborators.
///
/// A HOLD is never an error: it is a normal `GateDecision`. Errors are
/// reserved for bad caller input, bad configuration and collaborator
/// faults that happen after the decision is final.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    /// Invalid caller input (amount, scores, missing required score).
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid policy or override values.
    #[error("config error: {0}")]
    Config(String),

    /// Payment-execution collaborator failed.
    #[error("payment error: {0}")]
    Payment(String),

    /// Publication collaborator failed.
    #[error("publication error: {0}")]
    Publication(String),
}

pub type GateResult<T> = Result<T, GateError>;
