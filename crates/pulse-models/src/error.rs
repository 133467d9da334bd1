//! Model-level error types.

use thiserror::Error;

/// An illegal state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move {entity} from '{from}' to '{to}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

impl TransitionError {
    pub fn new(entity: &'static str, from: &'static str, to: &'static str) -> Self {
        Self { entity, from, to }
    }
}

/// Money arithmetic failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount must be positive")]
    NonPositive,

    #[error("amount {0} exceeds the maximum of {1}")]
    TooLarge(i64, i64),

    #[error("arithmetic overflow")]
    Overflow,
}
