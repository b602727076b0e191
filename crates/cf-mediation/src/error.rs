use thiserror::Error;

/// Errors raised while mediating a message or building a mediation
/// configuration.
///
/// Runtime variants are recovered by the nearest fault handler on the
/// context's stack; configuration variants fail fast at build time.
#[derive(Debug, Error)]
pub enum MediationError {
    #[error("Sequence not found: {0}")]
    SequenceNotFound(String),

    #[error("Split result at '{0}' is not an element node")]
    SplitResultNotElement(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mediation error: {0}")]
    Mediation(String),
}
