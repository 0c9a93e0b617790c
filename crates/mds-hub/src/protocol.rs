//! Streaming wire protocol.
//!
//! Inbound (client → server), one JSON object per text frame:
//!
//! ```json
//! {"type": "subscribe", "symbol": "AAPL"}
//! {"type": "unsubscribe", "symbol": "AAPL"}
//! {"type": "ping"}
//! ```
//!
//! Outbound acknowledgements carry `type`, `symbol` (when relevant) and a
//! millisecond `timestamp`. Data frames add a `data` payload:
//!
//! ```json
//! {"type": "tick", "symbol": "AAPL", "data": {...}, "timestamp": 1700000000000}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    symbol: Option<String>,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Subscribe(String),
    Unsubscribe(String),
    Ping,
    /// Well-formed but not actionable: unknown type or a missing symbol.
    Ignored(String),
}

pub fn parse_client_message(text: &str) -> Result<ClientRequest, serde_json::Error> {
    let raw: RawClientMessage = serde_json::from_str(text)?;
    let symbol = raw.symbol.filter(|s| !s.is_empty());

    Ok(match (raw.kind.as_str(), symbol) {
        ("subscribe", Some(symbol)) => ClientRequest::Subscribe(symbol),
        ("unsubscribe", Some(symbol)) => ClientRequest::Unsubscribe(symbol),
        ("subscribe" | "unsubscribe", None) => {
            ClientRequest::Ignored(format!("{} without symbol", raw.kind))
        }
        ("ping", _) => ClientRequest::Ping,
        (other, _) => ClientRequest::Ignored(format!("unknown message type: {other}")),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Subscribed,
    Unsubscribed,
}

impl AckKind {
    fn as_str(self) -> &'static str {
        match self {
            AckKind::Subscribed => "subscribed",
            AckKind::Unsubscribed => "unsubscribed",
        }
    }
}

/// Payload kinds pushed to symbol subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Tick,
    Ohlcv,
    Indicator,
}

impl DataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Tick => "tick",
            DataKind::Ohlcv => "ohlcv",
            DataKind::Indicator => "indicator",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    timestamp: u64,
}

// Envelopes of string and integer fields cannot fail to serialize.
fn encode_plain(kind: &str, symbol: Option<&str>, timestamp: u64) -> String {
    let envelope = Envelope::<()> { kind, symbol, data: None, timestamp };
    serde_json::to_string(&envelope).unwrap_or_default()
}

pub fn encode_ack(kind: AckKind, symbol: &str, timestamp: u64) -> String {
    encode_plain(kind.as_str(), Some(symbol), timestamp)
}

pub fn encode_pong(timestamp: u64) -> String {
    encode_plain("pong", None, timestamp)
}

pub fn encode_data<T: Serialize>(
    kind: DataKind,
    symbol: &str,
    data: &T,
    timestamp: u64,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope { kind: kind.as_str(), symbol: Some(symbol), data: Some(data), timestamp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn parses_inbound_requests() {
        assert_eq!(
            parse_client_message(r#"{"type":"subscribe","symbol":"AAPL"}"#).unwrap(),
            ClientRequest::Subscribe("AAPL".into())
        );
        assert_eq!(
            parse_client_message(r#"{"type":"unsubscribe","symbol":"AAPL"}"#).unwrap(),
            ClientRequest::Unsubscribe("AAPL".into())
        );
        assert_eq!(parse_client_message(r#"{"type":"ping"}"#).unwrap(), ClientRequest::Ping);
    }

    #[test]
    fn missing_symbol_and_unknown_types_are_ignored() {
        assert!(matches!(
            parse_client_message(r#"{"type":"subscribe"}"#).unwrap(),
            ClientRequest::Ignored(_)
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"subscribe","symbol":""}"#).unwrap(),
            ClientRequest::Ignored(_)
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"hello"}"#).unwrap(),
            ClientRequest::Ignored(_)
        ));
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(parse_client_message("not json").is_err());
        assert!(parse_client_message(r#"{"symbol":"AAPL"}"#).is_err());
    }

    #[test]
    fn acks_and_pong_shape() {
        let ack: Value = serde_json::from_str(&encode_ack(AckKind::Subscribed, "AAPL", 7)).unwrap();
        assert_eq!(ack, json!({ "type": "subscribed", "symbol": "AAPL", "timestamp": 7 }));

        let pong: Value = serde_json::from_str(&encode_pong(9)).unwrap();
        assert_eq!(pong, json!({ "type": "pong", "timestamp": 9 }));
    }

    #[test]
    fn data_envelope_shape() {
        let frame = encode_data(DataKind::Ohlcv, "AAPL", &json!({ "close": 1.5 }), 3).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({ "type": "ohlcv", "symbol": "AAPL", "data": { "close": 1.5 }, "timestamp": 3 })
        );
    }
}
