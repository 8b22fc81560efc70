use thiserror::Error;

use crate::timeframe::Timeframe;

#[derive(Debug, Error)]
pub enum Error {
    #[error("data source error: {0}")]
    Source(String),

    /// Expected, per-symbol terminal condition of a simulated replay.
    /// Never treated as a generic failure.
    #[error("backtesting ended for {symbol}")]
    BacktestingEnded { symbol: String },

    #[error("no routing target for {symbol} {timeframe}")]
    MissingRoute { symbol: String, timeframe: Timeframe },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_backtesting_ended(&self) -> bool {
        matches!(self, Error::BacktestingEnded { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
