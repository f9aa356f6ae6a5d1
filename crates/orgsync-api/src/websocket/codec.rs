// ── Engine.IO v4 / Socket.IO v5 text framing ──
//
// Each WebSocket text frame is one Engine.IO packet: a type digit followed
// by its payload. Engine `message` packets (4) wrap a Socket.IO packet:
//
//   <type>[<namespace>,][<ack id>][<json>]
//
// Binary attachments are not used by the office server and are rejected.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO `pong`, sent in reply to every server `ping`.
pub const PONG: &str = "3";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,

    #[error("unknown Engine.IO packet type {0:?}")]
    UnknownEngineType(char),

    #[error("unknown Socket.IO packet type {0:?}")]
    UnknownSocketType(char),

    #[error("binary Socket.IO packets are not supported")]
    Binary,

    #[error("invalid JSON payload: {0}")]
    Json(String),

    #[error("event packet without a name")]
    MissingEventName,
}

/// Handshake data from the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// Engine.IO server defaults, used when `open` omits the timings.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

impl OpenPayload {
    /// Longest silence before the link counts as dead: one ping interval
    /// plus the grace the server allows for it.
    pub fn heartbeat_window(&self) -> Duration {
        let interval = match self.ping_interval {
            0 => DEFAULT_PING_INTERVAL_MS,
            ms => ms,
        };
        let timeout = match self.ping_timeout {
            0 => DEFAULT_PING_TIMEOUT_MS,
            ms => ms,
        };
        Duration::from_millis(interval.saturating_add(timeout))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    /// A named event. `payload` is the first argument, or an array when
    /// the server sent several.
    Event { namespace: String, name: String, payload: Value },
    Ack { namespace: String, id: u64, data: Value },
    ConnectError { namespace: String, data: Value },
}

// ── Decoding ─────────────────────────────────────────────────────────

pub fn decode(frame: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| CodecError::Json(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

fn decode_socket(packet: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = packet.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(CodecError::Binary);
    }

    let (namespace, rest) = split_namespace(rest);
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let (ack, body) = rest.split_at(digits);
    let ack_id = ack.parse::<u64>().ok();
    let data = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(body).map_err(|e| CodecError::Json(e.to_string()))?)
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let Some(Value::Array(mut args)) = data else {
                return Err(CodecError::MissingEventName);
            };
            if args.is_empty() {
                return Err(CodecError::MissingEventName);
            }
            let Value::String(name) = args.remove(0) else {
                return Err(CodecError::MissingEventName);
            };
            let payload = match args.len() {
                0 => Value::Null,
                1 => args.remove(0),
                _ => Value::Array(args),
            };
            Ok(SocketPacket::Event {
                namespace,
                name,
                payload,
            })
        }
        '3' => Ok(SocketPacket::Ack {
            namespace,
            id: ack_id.unwrap_or_default(),
            data: data.unwrap_or(Value::Null),
        }),
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            data: data.unwrap_or(Value::Null),
        }),
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

/// A namespace is present only when the packet starts with `/`; it runs
/// up to the first `,` (or the end of the packet).
fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_owned(), rest);
    }
    match rest.find(',') {
        Some(end) => (rest[..end].to_owned(), &rest[end + 1..]),
        None => (rest.to_owned(), ""),
    }
}

// ── Encoding ─────────────────────────────────────────────────────────

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{namespace},")
    }
}

/// Socket.IO `CONNECT` for `namespace`, wrapped in an Engine `message`.
pub fn encode_connect(namespace: &str) -> String {
    format!("40{}", namespace_prefix(namespace))
}

/// Socket.IO `EVENT` carrying `[name, payload]`.
pub fn encode_event(namespace: &str, name: &str, payload: &Value) -> String {
    let args = Value::Array(vec![Value::String(name.to_owned()), payload.clone()]);
    format!("42{}{args}", namespace_prefix(namespace))
}
