use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Candle aggregation duration, drawn from the fixed exchange registry.
///
/// Variants are declared finest to coarsest; the derived `Ord` therefore
/// matches analytical accuracy (shorter timeframe = finer-grained).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Timeframe {
    pub const ALL: [Timeframe; 14] = [
        Timeframe::OneMinute,
        Timeframe::ThreeMinutes,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::TwoHours,
        Timeframe::FourHours,
        Timeframe::EightHours,
        Timeframe::TwelveHours,
        Timeframe::OneDay,
        Timeframe::ThreeDays,
        Timeframe::OneWeek,
        Timeframe::OneMonth,
    ];

    /// Duration of one candle in minutes.
    pub fn minutes(self) -> u64 {
        match self {
            Timeframe::OneMinute => 1,
            Timeframe::ThreeMinutes => 3,
            Timeframe::FiveMinutes => 5,
            Timeframe::FifteenMinutes => 15,
            Timeframe::ThirtyMinutes => 30,
            Timeframe::OneHour => 60,
            Timeframe::TwoHours => 120,
            Timeframe::FourHours => 240,
            Timeframe::EightHours => 480,
            Timeframe::TwelveHours => 720,
            Timeframe::OneDay => 1_440,
            Timeframe::ThreeDays => 4_320,
            Timeframe::OneWeek => 10_080,
            Timeframe::OneMonth => 43_200,
        }
    }

    /// Duration of one candle in seconds.
    pub fn duration_secs(self) -> u64 {
        self.minutes() * 60
    }

    fn label(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::ThreeMinutes => "3m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHours => "2h",
            Timeframe::FourHours => "4h",
            Timeframe::EightHours => "8h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThreeDays => "3d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.label() == s)
            .ok_or_else(|| crate::Error::Config(format!("unknown timeframe '{s}'")))
    }
}

/// Sort timeframes in order of analytical accuracy: finest first, so the
/// most granular data is refreshed and evaluated before coarser views.
pub fn sort_by_accuracy(mut timeframes: Vec<Timeframe>) -> Vec<Timeframe> {
    timeframes.sort_by_key(|tf| tf.minutes());
    timeframes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_finest_to_coarsest() {
        let sorted = sort_by_accuracy(vec![
            Timeframe::OneHour,
            Timeframe::OneMinute,
            Timeframe::OneDay,
        ]);
        assert_eq!(
            sorted,
            vec![Timeframe::OneMinute, Timeframe::OneHour, Timeframe::OneDay]
        );
    }

    #[test]
    fn ord_matches_duration() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].minutes() < pair[1].minutes());
        }
    }

    #[test]
    fn parses_registry_labels() {
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::OneMinute);
        assert_eq!("1M".parse::<Timeframe>().unwrap(), Timeframe::OneMonth);
        assert!("7m".parse::<Timeframe>().is_err());
    }
}
