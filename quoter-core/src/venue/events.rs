//! Venue wire-event parsing
//!
//! Inbound frames arrive as a `{topic, event, payload}` envelope with the
//! event type as a string. Everything is parsed once here, at the boundary,
//! into the [`VenueEvent`] sum type; the engine only ever dispatches on
//! variants. Monetary fields arrive as decimal strings and parse through
//! `rust_decimal` — binary floats never enter the core.
//!
//! Parsing failures are recoverable by policy: the demultiplexer logs a
//! warning and skips the frame.

use crate::core::{ExecutionBand, Side};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed venue message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing '{0}' in venue payload")]
    MissingField(&'static str),
    #[error("field '{0}' has an unusable value")]
    InvalidField(&'static str),
    #[error("unknown venue event '{0}'")]
    UnknownEvent(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    event: String,
    payload: Value,
}

/// One balance line from a `user_data` partial.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BalanceEntry {
    pub asset: String,
    pub available: Decimal,
    pub frozen: Decimal,
}

/// One pre-existing open order from a `user_data` partial.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenOrder {
    pub client_order_id: u64,
    pub amount: Decimal,
    pub price: Decimal,
    pub side: Side,
    pub market: String,
}

/// One position line from a `user_data` partial.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PositionEntry {
    pub market: String,
    pub amount: Decimal,
    pub funding: Decimal,
    pub entry_price: Decimal,
    pub liquidation_price: Decimal,
    pub total_margin: Decimal,
}

/// Full `user_data` snapshot sent on subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserDataPartial {
    pub balance: Vec<BalanceEntry>,
    pub orders: Vec<OpenOrder>,
    pub positions: Vec<PositionEntry>,
}

/// Order-lifecycle events keyed by `client_order_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventKind {
    Acknowledge,
    Maker,
    Active,
    Delete,
    AbortCreate,
    Reject,
    RejectCancel,
}

/// Execution-report events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    TakerTrade,
    MakerTrade,
    Liquidation,
    AutoDeleverage,
}

/// A fully parsed venue frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueEvent {
    UserDataPartial(UserDataPartial),
    MarketDataPartial {
        execution_band: ExecutionBand,
    },
    AuctionUpdate {
        auction_id: u64,
        execution_band: Option<ExecutionBand>,
    },
    OrderLifecycle {
        kind: OrderEventKind,
        client_order_id: u64,
    },
    Execution {
        kind: ExecutionKind,
        /// Absent (or zero on the wire) when the execution does not belong
        /// to one of our tracked orders, e.g. a liquidation sweep.
        client_order_id: Option<u64>,
        execution_amount: Decimal,
        side: Side,
    },
    /// Accepted, carries nothing the core acts on
    /// (`trade`, `balance`, `phx_reply`, `update_position`).
    Noise,
}

/// Parse one raw frame from the venue stream.
pub fn parse_venue_message(raw: &str) -> Result<VenueEvent, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    parse_envelope(envelope)
}

fn parse_envelope(envelope: Envelope) -> Result<VenueEvent, ProtocolError> {
    let Envelope {
        topic,
        event,
        payload,
    } = envelope;

    match event.as_str() {
        "partial" => match topic.as_str() {
            "user_data" => Ok(VenueEvent::UserDataPartial(serde_json::from_value(
                payload,
            )?)),
            "market_data" => {
                let band = payload
                    .get("execution_band")
                    .filter(|v| !v.is_null())
                    .ok_or(ProtocolError::MissingField("execution_band"))?;
                Ok(VenueEvent::MarketDataPartial {
                    execution_band: serde_json::from_value(band.clone())?,
                })
            }
            _ => Ok(VenueEvent::Noise),
        },
        "update" => {
            let auction_id = u64_field(&payload, "auction_id")?;
            let execution_band = match payload.get("execution_band").filter(|v| !v.is_null()) {
                Some(v) => Some(serde_json::from_value(v.clone())?),
                None => None,
            };
            Ok(VenueEvent::AuctionUpdate {
                auction_id,
                execution_band,
            })
        }
        "acknowledge_order" | "maker_order" | "active_order" | "delete_order"
        | "abort_create" | "reject_order" | "reject_cancel" => {
            let kind = match event.as_str() {
                "acknowledge_order" => OrderEventKind::Acknowledge,
                "maker_order" => OrderEventKind::Maker,
                "active_order" => OrderEventKind::Active,
                "delete_order" => OrderEventKind::Delete,
                "abort_create" => OrderEventKind::AbortCreate,
                "reject_order" => OrderEventKind::Reject,
                _ => OrderEventKind::RejectCancel,
            };
            Ok(VenueEvent::OrderLifecycle {
                kind,
                client_order_id: u64_field(&payload, "client_order_id")?,
            })
        }
        "taker_trade" | "maker_trade" | "liquidation" | "auto_deleverage" => {
            let kind = match event.as_str() {
                "taker_trade" => ExecutionKind::TakerTrade,
                "maker_trade" => ExecutionKind::MakerTrade,
                "liquidation" => ExecutionKind::Liquidation,
                _ => ExecutionKind::AutoDeleverage,
            };
            // Zero doubles as "no order" on the wire.
            let client_order_id =
                opt_u64_field(&payload, "client_order_id")?.filter(|id| *id != 0);
            let execution_amount = decimal_field(&payload, "execution_amount")?;
            let side = payload
                .get("side")
                .ok_or(ProtocolError::MissingField("side"))
                .and_then(|v| {
                    serde_json::from_value(v.clone()).map_err(ProtocolError::Malformed)
                })?;
            Ok(VenueEvent::Execution {
                kind,
                client_order_id,
                execution_amount,
                side,
            })
        }
        "trade" | "balance" | "phx_reply" | "update_position" => Ok(VenueEvent::Noise),
        other => Err(ProtocolError::UnknownEvent(other.to_string())),
    }
}

/// Integer fields occasionally arrive stringified; accept both.
fn u64_from_value(value: &Value, name: &'static str) -> Result<u64, ProtocolError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or(ProtocolError::InvalidField(name)),
        Value::String(s) => s.parse().map_err(|_| ProtocolError::InvalidField(name)),
        _ => Err(ProtocolError::InvalidField(name)),
    }
}

fn u64_field(payload: &Value, name: &'static str) -> Result<u64, ProtocolError> {
    let value = payload
        .get(name)
        .ok_or(ProtocolError::MissingField(name))?;
    u64_from_value(value, name)
}

fn opt_u64_field(payload: &Value, name: &'static str) -> Result<Option<u64>, ProtocolError> {
    match payload.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => u64_from_value(value, name).map(Some),
    }
}

fn decimal_field(payload: &Value, name: &'static str) -> Result<Decimal, ProtocolError> {
    let value = payload
        .get(name)
        .ok_or(ProtocolError::MissingField(name))?;
    serde_json::from_value(value.clone()).map_err(ProtocolError::Malformed)
}
