pub mod config;
pub mod error;
pub mod evaluator;
pub mod source;
pub mod timeframe;
pub mod types;

pub use config::{Config, WatchEntry, WatchlistConfig};
pub use error::{Error, Result};
pub use evaluator::{EvaluatorConfig, PairEvaluator, SymbolEvaluator, TaskManager};
pub use source::MarketDataSource;
pub use timeframe::Timeframe;
pub use types::*;
