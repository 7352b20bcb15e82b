//! Data models for accounts, orders, positions and market data

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Trading account snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub status: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin: Decimal,
    pub free_margin: Decimal,
}

/// Order resource.
///
/// Order semantics are opaque to the SDK; fields are passed through from the
/// server unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order[{}]: {} {} {} x{} ({})",
            self.id, self.side, self.order_type, self.symbol, self.quantity, self.status
        )
    }
}

/// Request body for placing an order
#[derive(Debug, Clone, Serialize, Default)]
pub struct NewOrder {
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

/// Open position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub pnl: Decimal,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position[{}]: {} {} x{} entry={} pnl={}",
            self.id, self.side, self.symbol, self.quantity, self.entry_price, self.pnl
        )
    }
}

/// Level-1 market data quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketData {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for MarketData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Quote[{}]: bid={} ask={} last={} vol={} @ {}",
            self.symbol, self.bid, self.ask, self.last, self.volume, self.timestamp
        )
    }
}

/// Event kind for dispatcher registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MarketData,
    OrderUpdate,
    PositionUpdate,
    ProtocolError,
    Unrecognized,
}

/// Decoded inbound event.
///
/// Transient values consumed by the dispatcher; never persisted.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    MarketData(MarketData),
    OrderUpdate(Order),
    PositionUpdate(Position),
    /// Server-reported error frame, payload passed through as-is
    ProtocolError(Value),
    /// Frame with an unknown tag. Dispatched rather than dropped so callers
    /// retain visibility into protocol drift.
    Unrecognized(Value),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::MarketData(_) => EventKind::MarketData,
            SessionEvent::OrderUpdate(_) => EventKind::OrderUpdate,
            SessionEvent::PositionUpdate(_) => EventKind::PositionUpdate,
            SessionEvent::ProtocolError(_) => EventKind::ProtocolError,
            SessionEvent::Unrecognized(_) => EventKind::Unrecognized,
        }
    }
}

/// Session lifecycle state. Single-writer: only the session driver task
/// performs transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribing,
    Live,
    Reconnecting(u32),
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Reconnecting(n) => write!(f, "Reconnecting(attempt {})", n),
            other => write!(f, "{:?}", other),
        }
    }
}
