//! Market data records: the values flowing from providers through the
//! indicator engine to the hub and the persistent store.
//!
//! # Timestamp convention
//!
//! All timestamps are **milliseconds since Unix epoch** (ms).

use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

// ---------------------------------------------------------------------------
// Bar (OHLCV)
// ---------------------------------------------------------------------------

/// One aggregated OHLCV bar.
///
/// Identity key is `(timestamp, symbol, timeframe)`; the store upserts on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: u64,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timeframe: Timeframe,
}

impl Bar {
    /// Identity key used for upserts.
    pub fn key(&self) -> (u64, &str, Timeframe) {
        (self.timestamp, &self.symbol, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// A single trade / quote event.
///
/// Identity key is `(timestamp, symbol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: u64,
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
}

// ---------------------------------------------------------------------------
// IndicatorValue
// ---------------------------------------------------------------------------

/// A single computed indicator point, as persisted and broadcast.
///
/// Identity key is `(timestamp, symbol, timeframe, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub timestamp: u64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub name: String,
    pub value: f64,
    /// Secondary outputs (signal line, bands, %D...) keyed by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// A listed instrument in the stock catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub exchange: String,
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for Bar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bar({} {} o={:.4} h={:.4} l={:.4} c={:.4} v={:.2} t={})",
            self.symbol, self.timeframe, self.open, self.high, self.low, self.close, self.volume, self.timestamp
        )
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tick({} {:.4}x{:.2} t={})", self.symbol, self.price, self.volume, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_omits_missing_quote_sides() {
        let tick = Tick {
            timestamp: 1,
            symbol: "INFY".into(),
            price: 1500.0,
            volume: 10.0,
            bid: None,
            ask: Some(1500.5),
        };
        let json = serde_json::to_value(&tick).unwrap();
        assert!(json.get("bid").is_none());
        assert_eq!(json["ask"], 1500.5);

        let back: Tick = serde_json::from_value(json).unwrap();
        assert_eq!(back, tick);
    }

    #[test]
    fn bar_key_and_timeframe_label() {
        let bar = Bar {
            timestamp: 60_000,
            symbol: "TCS".into(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100.0,
            timeframe: Timeframe::M5,
        };
        assert_eq!(bar.key(), (60_000, "TCS", Timeframe::M5));
        let json = serde_json::to_value(&bar).unwrap();
        assert_eq!(json["timeframe"], "5m");
    }
}
