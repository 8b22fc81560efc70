use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;
use crate::types::FeedMode;

/// Process-level configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    /// Live wall-clock polling or simulated-clock replay.
    pub mode: FeedMode,
    /// Path to the watchlist TOML file.
    pub watchlist_path: String,
    /// Cadence of the non-candle polling producers, in seconds.
    pub poll_interval_secs: u64,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let mode = match required_env("FEED_MODE").to_lowercase().as_str() {
            "live" => FeedMode::Live,
            "backtest" => FeedMode::Backtest,
            other => panic!("ERROR: FEED_MODE must be 'live' or 'backtest', got: '{other}'"),
        };

        Config {
            mode,
            watchlist_path: optional_env("WATCHLIST_PATH")
                .unwrap_or_else(|| "config/watchlist.toml".to_string()),
            poll_interval_secs: optional_env("POLL_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Top-level watchlist file (TOML): which symbols to monitor on which
/// timeframes.
///
/// Example `config/watchlist.toml`:
/// ```toml
/// [[watch]]
/// symbol = "BTC/USDT"
/// timeframes = ["1m", "1h"]
///
/// [[watch]]
/// symbol = "ETH/USDT"
/// timeframes = ["1m"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchlistConfig {
    #[serde(rename = "watch")]
    pub entries: Vec<WatchEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchEntry {
    /// Traded pair, e.g. "BTC/USDT".
    pub symbol: String,
    pub timeframes: Vec<Timeframe>,
}

impl WatchlistConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read watchlist at '{path}': {e}"));
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse watchlist at '{path}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchlist_parses_timeframe_labels() {
        let cfg: WatchlistConfig = toml::from_str(
            r#"
            [[watch]]
            symbol = "BTC/USDT"
            timeframes = ["1m", "1h"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.entries.len(), 1);
        assert_eq!(
            cfg.entries[0].timeframes,
            vec![Timeframe::OneMinute, Timeframe::OneHour]
        );
    }
}
