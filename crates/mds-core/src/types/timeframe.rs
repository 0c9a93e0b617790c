//! Bar timeframes.
//!
//! The set is closed: anything the service does not recognize falls back to
//! [`Timeframe::M1`], the finest granularity, so synthetic series still
//! advance by a sane step.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregation interval of an OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All supported timeframes, finest first.
    pub const ALL: [Timeframe; 7] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    /// Parse a timeframe label, returning `None` for unknown labels.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            "1d" => Some(Self::D1),
            _ => None,
        }
    }

    /// Parse a timeframe label, defaulting to `1m` for unknown labels.
    pub fn parse_or_finest(label: &str) -> Self {
        Self::parse(label).unwrap_or_default()
    }

    /// Wire label (`"1m"`, `"1h"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Length of one bar.
    pub fn step(self) -> Duration {
        const MINUTE: u64 = 60;
        let secs = match self {
            Self::M1 => MINUTE,
            Self::M5 => 5 * MINUTE,
            Self::M15 => 15 * MINUTE,
            Self::M30 => 30 * MINUTE,
            Self::H1 => 60 * MINUTE,
            Self::H4 => 240 * MINUTE,
            Self::D1 => 1440 * MINUTE,
        };
        Duration::from_secs(secs)
    }

    /// Length of one bar in milliseconds.
    pub fn step_ms(self) -> u64 {
        self.step().as_millis() as u64
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_labels() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
    }

    #[test]
    fn unknown_label_falls_back_to_one_minute() {
        assert_eq!(Timeframe::parse("7m"), None);
        assert_eq!(Timeframe::parse_or_finest("7m"), Timeframe::M1);
        assert_eq!(Timeframe::parse_or_finest(""), Timeframe::M1);
    }

    #[test]
    fn steps() {
        assert_eq!(Timeframe::M1.step_ms(), 60_000);
        assert_eq!(Timeframe::M5.step_ms(), 300_000);
        assert_eq!(Timeframe::H1.step(), Duration::from_secs(3600));
        assert_eq!(Timeframe::D1.step(), Duration::from_secs(86_400));
    }

    #[test]
    fn serde_uses_wire_labels() {
        let json = serde_json::to_string(&Timeframe::M15).unwrap();
        assert_eq!(json, "\"15m\"");
        let tf: Timeframe = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(tf, Timeframe::H4);
    }
}
