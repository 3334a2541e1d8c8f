use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
