//! Wire codec for the streaming protocol.
//!
//! Frames are JSON objects. Inbound: `{"type": string, "data": any}`.
//! Outbound: `{"type": "auth", "token": ...}` and
//! `{"type": "subscribe"|"unsubscribe", "channel": ..., "symbols"|"account_id": ...}`.

use crate::{
    data::{MarketData, Order, Position, SessionEvent},
    error::DecodeError,
    ledger::{Subscription, SubscriptionKind},
};
use serde::Serialize;
use serde_json::Value;

/// Outbound frame sent to the streaming endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Auth {
        token: String,
    },
    Subscribe {
        channel: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        symbols: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
    },
    Unsubscribe {
        channel: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        symbols: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
    },
}

impl OutboundFrame {
    pub fn auth(token: &str) -> Self {
        OutboundFrame::Auth {
            token: token.to_string(),
        }
    }

    pub fn subscribe(subscription: &Subscription) -> Self {
        let (symbols, account_id) = Self::target(subscription);
        OutboundFrame::Subscribe {
            channel: subscription.kind.channel(),
            symbols,
            account_id,
        }
    }

    pub fn unsubscribe(subscription: &Subscription) -> Self {
        let (symbols, account_id) = Self::target(subscription);
        OutboundFrame::Unsubscribe {
            channel: subscription.kind.channel(),
            symbols,
            account_id,
        }
    }

    fn target(subscription: &Subscription) -> (Option<Vec<String>>, Option<String>) {
        match subscription.kind {
            SubscriptionKind::MarketData => (Some(vec![subscription.key.clone()]), None),
            SubscriptionKind::OrderChannel | SubscriptionKind::PositionChannel => {
                (None, Some(subscription.key.clone()))
            }
        }
    }

    pub fn to_text(&self) -> Result<String, DecodeError> {
        serde_json::to_string(self).map_err(|e| DecodeError::InvalidJson(e.to_string()))
    }
}

/// Decode an inbound text frame into a session event.
///
/// Known tags map to their typed payloads; `error` frames pass the payload
/// through; anything else becomes `Unrecognized` so it is never dropped
/// silently. Only malformed JSON or a malformed payload for a known tag is
/// an error.
pub fn decode_frame(text: &str) -> Result<SessionEvent, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("type"))?
        .to_string();
    let data = value.get("data").cloned().unwrap_or(Value::Null);

    match tag.as_str() {
        "market_data" => serde_json::from_value::<MarketData>(data)
            .map(SessionEvent::MarketData)
            .map_err(|e| malformed(&tag, e)),
        "order_update" => serde_json::from_value::<Order>(data)
            .map(SessionEvent::OrderUpdate)
            .map_err(|e| malformed(&tag, e)),
        "position_update" => serde_json::from_value::<Position>(data)
            .map(SessionEvent::PositionUpdate)
            .map_err(|e| malformed(&tag, e)),
        "error" => Ok(SessionEvent::ProtocolError(data)),
        _ => Ok(SessionEvent::Unrecognized(value)),
    }
}

fn malformed(tag: &str, e: serde_json::Error) -> DecodeError {
    DecodeError::MalformedPayload {
        tag: tag.to_string(),
        reason: e.to_string(),
    }
}

/// Explicit auth rejection by the peer, checked during the auth grace
/// window. Returns the server-provided reason when the frame is a rejection.
pub fn auth_rejection_reason(event: &SessionEvent) -> Option<String> {
    let message = |v: &Value| {
        v.get("message")
            .and_then(Value::as_str)
            .unwrap_or("authentication rejected by server")
            .to_string()
    };
    match event {
        SessionEvent::Unrecognized(value)
            if value.get("type").and_then(Value::as_str) == Some("auth_rejected") =>
        {
            Some(message(value.get("data").unwrap_or(&Value::Null)))
        }
        SessionEvent::ProtocolError(data)
            if data.get("code").and_then(Value::as_str) == Some("auth_rejected") =>
        {
            Some(message(data))
        }
        _ => None,
    }
}
