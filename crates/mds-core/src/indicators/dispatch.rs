//! Single entry point over all indicators.
//!
//! Two request forms are accepted: typed [`IndicatorParams`] for in-process
//! callers, and a name plus a JSON key/value map for wire requests. The map
//! form is parsed into the typed form so both share one code path.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::types::Bar;

use super::atr::atr;
use super::bollinger::{BollingerBands, bollinger_bands};
use super::macd::{MacdSeries, macd};
use super::moving_average::{ema, sma};
use super::rsi::rsi;
use super::stochastic::{StochasticSeries, stochastic};
use super::IndicatorError;

/// Indicator names as they appear on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    BollingerBands,
    Stochastic,
    Atr,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 7] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::BollingerBands,
        IndicatorKind::Stochastic,
        IndicatorKind::Atr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::BollingerBands => "bollinger_bands",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::Atr => "atr",
        }
    }

    pub fn parse(name: &str) -> Result<Self, IndicatorError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| IndicatorError::UnknownIndicator(name.to_string()))
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerParams {
    pub period: usize,
    pub deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticParams {
    pub k_period: usize,
    pub d_period: usize,
}

/// One indicator request with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorParams {
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize },
    Macd(MacdParams),
    BollingerBands(BollingerParams),
    Stochastic(StochasticParams),
    Atr { period: usize },
}

impl IndicatorParams {
    pub fn kind(&self) -> IndicatorKind {
        match self {
            IndicatorParams::Sma { .. } => IndicatorKind::Sma,
            IndicatorParams::Ema { .. } => IndicatorKind::Ema,
            IndicatorParams::Rsi { .. } => IndicatorKind::Rsi,
            IndicatorParams::Macd(_) => IndicatorKind::Macd,
            IndicatorParams::BollingerBands(_) => IndicatorKind::BollingerBands,
            IndicatorParams::Stochastic(_) => IndicatorKind::Stochastic,
            IndicatorParams::Atr { .. } => IndicatorKind::Atr,
        }
    }

    /// Parse the untyped form. Keys are camelCase (`fastPeriod`) with
    /// snake_case aliases (`fast_period`); numbers may be integral floats.
    pub fn from_map(name: &str, params: &Map<String, Value>) -> Result<Self, IndicatorError> {
        let kind = IndicatorKind::parse(name)?;
        let reader = ParamReader { indicator: kind.as_str(), params };

        Ok(match kind {
            IndicatorKind::Sma => IndicatorParams::Sma { period: reader.period("period", None)? },
            IndicatorKind::Ema => IndicatorParams::Ema { period: reader.period("period", None)? },
            IndicatorKind::Rsi => IndicatorParams::Rsi { period: reader.period("period", None)? },
            IndicatorKind::Atr => IndicatorParams::Atr { period: reader.period("period", None)? },
            IndicatorKind::Macd => IndicatorParams::Macd(MacdParams {
                fast: reader.period("fastPeriod", Some("fast_period"))?,
                slow: reader.period("slowPeriod", Some("slow_period"))?,
                signal: reader.period("signalPeriod", Some("signal_period"))?,
            }),
            IndicatorKind::BollingerBands => IndicatorParams::BollingerBands(BollingerParams {
                period: reader.period("period", None)?,
                deviation: reader.number("deviation", None)?,
            }),
            IndicatorKind::Stochastic => IndicatorParams::Stochastic(StochasticParams {
                k_period: reader.period("kPeriod", Some("k_period"))?,
                d_period: reader.period("dPeriod", Some("d_period"))?,
            }),
        })
    }
}

struct ParamReader<'a> {
    indicator: &'static str,
    params: &'a Map<String, Value>,
}

impl ParamReader<'_> {
    fn raw(&self, key: &'static str, alias: Option<&'static str>) -> Result<&Value, IndicatorError> {
        self.params
            .get(key)
            .or_else(|| alias.and_then(|a| self.params.get(a)))
            .ok_or(IndicatorError::MissingParameter { indicator: self.indicator, parameter: key })
    }

    /// A value of the wrong type counts as missing; only a present zero
    /// period is invalid.
    fn mistyped(&self, key: &'static str) -> IndicatorError {
        IndicatorError::MissingParameter { indicator: self.indicator, parameter: key }
    }

    fn number(&self, key: &'static str, alias: Option<&'static str>) -> Result<f64, IndicatorError> {
        self.raw(key, alias)?.as_f64().ok_or_else(|| self.mistyped(key))
    }

    fn period(&self, key: &'static str, alias: Option<&'static str>) -> Result<usize, IndicatorError> {
        let value = self.raw(key, alias)?;
        if let Some(n) = value.as_u64() {
            return Ok(usize::try_from(n).unwrap_or(usize::MAX));
        }
        match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as usize),
            _ => Err(self.mistyped(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_bars;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn named_sma_matches_direct_call() {
        let bars = test_bars();
        let out = compute_named("sma", &bars, &map(json!({ "period": 5 }))).unwrap();
        assert_eq!(out, IndicatorOutput::Series(sma(&bars, 5).unwrap()));
        assert_eq!(out.len(), bars.len());
        assert!((out.point(4).unwrap().0 - 107.8).abs() < 1e-9);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = compute_named("vwap", &test_bars(), &Map::new()).unwrap_err();
        assert_eq!(err, IndicatorError::UnknownIndicator("vwap".into()));
    }

    #[test]
    fn missing_parameter_names_the_key() {
        let err = IndicatorParams::from_map("macd", &map(json!({ "fastPeriod": 3, "slowPeriod": 6 })))
            .unwrap_err();
        assert_eq!(
            err,
            IndicatorError::MissingParameter { indicator: "macd", parameter: "signalPeriod" }
        );

        let err = IndicatorParams::from_map("bollinger_bands", &map(json!({ "period": 5 })))
            .unwrap_err();
        assert_eq!(
            err,
            IndicatorError::MissingParameter { indicator: "bollinger_bands", parameter: "deviation" }
        );
    }

    #[test]
    fn snake_case_aliases_and_float_periods() {
        let params = IndicatorParams::from_map(
            "stochastic",
            &map(json!({ "k_period": 5.0, "dPeriod": 3 })),
        )
        .unwrap();
        assert_eq!(params, IndicatorParams::Stochastic(StochasticParams { k_period: 5, d_period: 3 }));

        let params = IndicatorParams::from_map(
            "macd",
            &map(json!({ "fast_period": 3, "slow_period": 6, "signal_period": 4 })),
        )
        .unwrap();
        assert_eq!(params, IndicatorParams::Macd(MacdParams { fast: 3, slow: 6, signal: 4 }));
    }

    #[test]
    fn mistyped_parameters_count_as_missing() {
        let err = IndicatorParams::from_map("rsi", &map(json!({ "period": 2.5 }))).unwrap_err();
        assert_eq!(err, IndicatorError::MissingParameter { indicator: "rsi", parameter: "period" });

        let err = compute_named("sma", &test_bars(), &map(json!({ "period": "five" }))).unwrap_err();
        assert_eq!(err, IndicatorError::MissingParameter { indicator: "sma", parameter: "period" });

        let err = IndicatorParams::from_map("ema", &map(json!({ "period": -3 }))).unwrap_err();
        assert!(matches!(err, IndicatorError::MissingParameter { .. }));

        let err = IndicatorParams::from_map(
            "bollinger_bands",
            &map(json!({ "period": 5, "deviation": "wide" })),
        )
        .unwrap_err();
        assert_eq!(
            err,
            IndicatorError::MissingParameter { indicator: "bollinger_bands", parameter: "deviation" }
        );
    }

    #[test]
    fn zero_period_is_invalid() {
        let err = compute_named("sma", &test_bars(), &map(json!({ "period": 0 }))).unwrap_err();
        assert!(matches!(err, IndicatorError::InvalidParameter { parameter: "period", .. }));
    }

    #[test]
    fn huge_periods_are_insufficient_data() {
        let bars = test_bars();
        for (name, params) in [
            ("sma", json!({ "period": u64::MAX })),
            ("ema", json!({ "period": u64::MAX })),
            ("rsi", json!({ "period": u64::MAX })),
            ("atr", json!({ "period": u64::MAX })),
            ("bollinger_bands", json!({ "period": u64::MAX, "deviation": 2.0 })),
            ("macd", json!({ "fastPeriod": 2, "slowPeriod": 4, "signalPeriod": u64::MAX })),
            ("macd", json!({ "fastPeriod": u64::MAX, "slowPeriod": 4, "signalPeriod": 3 })),
            ("stochastic", json!({ "kPeriod": 3, "dPeriod": u64::MAX })),
            ("stochastic", json!({ "kPeriod": u64::MAX, "dPeriod": 3 })),
        ] {
            let err = compute_named(name, &bars, &map(params)).unwrap_err();
            assert!(
                matches!(err, IndicatorError::InsufficientData { got: 10, .. }),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn every_kind_dispatches_with_full_length_output() {
        let bars = test_bars();
        let defaults = IndicatorDefaults {
            sma_period: 3,
            ema_period: 3,
            rsi_period: 3,
            macd_fast: 2,
            macd_slow: 4,
            macd_signal: 3,
            bollinger_period: 3,
            bollinger_deviation: 2.0,
            stochastic_k: 3,
            stochastic_d: 2,
            atr_period: 3,
        };
        for kind in IndicatorKind::ALL {
            let params = defaults.params(kind);
            assert_eq!(params.kind(), kind);
            let out = compute(&bars, &params).unwrap();
            assert_eq!(out.len(), bars.len(), "{kind}");
        }
    }

    #[test]
    fn point_carries_secondary_lines() {
        let bars = test_bars();
        let out = compute(
            &bars,
            &IndicatorParams::BollingerBands(BollingerParams { period: 5, deviation: 2.0 }),
        )
        .unwrap();
        let (middle, meta) = out.point(9).unwrap();
        let meta = meta.unwrap();
        assert!(meta["upper"].as_f64().unwrap() > middle);
        assert!(meta["lower"].as_f64().unwrap() < middle);
        assert!(out.point(10).is_none());
    }

    #[test]
    fn kind_round_trips_through_serde() {
        let kind: IndicatorKind = serde_json::from_str("\"bollinger_bands\"").unwrap();
        assert_eq!(kind, IndicatorKind::BollingerBands);
        assert_eq!(IndicatorKind::parse("atr").unwrap(), IndicatorKind::Atr);
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let defaults: IndicatorDefaults = serde_json::from_str(r#"{"rsi_period": 7}"#).unwrap();
        assert_eq!(defaults.rsi_period, 7);
        assert_eq!(defaults.macd_slow, 26);
        assert_eq!(defaults.bollinger_deviation, 2.0);
    }
}
