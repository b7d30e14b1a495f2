use thiserror::Error;

/// Domain errors raised by the detection and execution core
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArbError {
    /// Triple spans three coins but one coin edge has no pair in it
    #[error("Triangle {key}: no pair connects {from} and {to}")]
    TriangleResolution {
        key: String,
        from: String,
        to: String,
    },

    #[error("Invalid triple: {0}")]
    InvalidTriple(String),

    /// Pair universe could not be obtained or is unusable
    #[error("Startup failure: {0}")]
    Startup(String),

    #[error("Config Error: {0}")]
    Config(String),
}

/// Why a single leg simulation produced no quantity
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimError {
    /// Feed has no usable price for the pair right now
    #[error("No market data for {0}")]
    MissingMarketData(String),

    #[error("Invalid input quantity: {0}")]
    InvalidQuantity(f64),
}

/// Failure of one order leg at the exchange or on the way there
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Order rejected ({code}): {message}")]
    Rejected {
        code: i64,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Order timed out")]
    Timeout,

    #[error("Invalid order: {0}")]
    Invalid(String),
}
