use crate::model::ModelError;
use schema::ValidationError;
use thiserror::Error;

/// Terminal failures of an exchange.
///
/// Recoverable conditions (tool lookup and argument failures, content
/// validation failures within budget) never appear here; they are folded
/// back into the conversation instead. What does appear is final.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider failed after the adapter's own transport retries.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Every validation retry was consumed without a conforming reply.
    #[error("retry budget exhausted after {retries} retries: {last}")]
    Exhausted {
        retries: u32,
        last: ValidationError,
    },

    /// The model kept requesting tools past the configured ceiling.
    #[error("tool turn limit reached ({0})")]
    ToolTurnLimit(u32),

    /// The caller cancelled the exchange.
    #[error("exchange cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
