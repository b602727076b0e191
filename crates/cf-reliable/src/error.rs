use thiserror::Error;

/// Errors raised by the reliable-messaging engine.
///
/// Inside the polling loop these are contained per iteration: the
/// transaction is rolled back, the error is logged, and the loop continues
/// on its next tick.
#[derive(Debug, Error)]
pub enum ReliableError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Message store error: {0}")]
    Store(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}
