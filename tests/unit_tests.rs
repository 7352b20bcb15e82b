//! Unit tests for individual modules

use chrono::{Duration as ChronoDuration, Utc};
use projectx_sdk::{
    config::*,
    data::*,
    error::*,
    events::*,
    frames::*,
    ledger::*,
    session::backoff,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Event dispatcher

#[test]
fn dispatcher_starts_empty() {
    let dispatcher = EventDispatcher::new();
    assert_eq!(dispatcher.callback_count(EventKind::MarketData), 0);
    assert_eq!(dispatcher.callback_count(EventKind::OrderUpdate), 0);
}

#[test]
fn dispatcher_registration_and_removal() {
    let dispatcher = EventDispatcher::new();
    let id1 = dispatcher.register(EventKind::MarketData, Arc::new(|_| {}));
    let id2 = dispatcher.register(EventKind::OrderUpdate, Arc::new(|_| {}));
    assert_ne!(id1, id2);
    assert_eq!(dispatcher.callback_count(EventKind::MarketData), 1);
    assert_eq!(dispatcher.callback_count(EventKind::OrderUpdate), 1);

    assert!(dispatcher.unregister(EventKind::MarketData, id1));
    assert!(!dispatcher.unregister(EventKind::MarketData, id1));
    assert_eq!(dispatcher.callback_count(EventKind::MarketData), 0);
}

#[test]
fn dispatcher_routes_protocol_errors() {
    let dispatcher = EventDispatcher::new();
    let payloads: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let payloads = Arc::clone(&payloads);
        dispatcher.register(
            EventKind::ProtocolError,
            Arc::new(move |event| {
                if let SessionEvent::ProtocolError(value) = event {
                    payloads.lock().unwrap().push(value.clone());
                }
            }),
        );
    }

    dispatcher.dispatch(&SessionEvent::ProtocolError(json!({"code": "rate_limited"})));
    assert_eq!(payloads.lock().unwrap().len(), 1);
}

#[test]
fn error_channel_receives_observer_panics() {
    let dispatcher = EventDispatcher::new();
    let errors = Arc::new(AtomicUsize::new(0));
    {
        let errors = Arc::clone(&errors);
        dispatcher.register_error(Arc::new(move |_| {
            errors.fetch_add(1, Ordering::SeqCst);
        }));
    }
    dispatcher.register(EventKind::Unrecognized, Arc::new(|_| panic!("boom")));
    dispatcher.dispatch(&SessionEvent::Unrecognized(json!({"type": "x"})));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

// Subscription ledger

#[test]
fn ledger_replay_order_is_deterministic() {
    let mut ledger = SubscriptionLedger::new();
    ledger.add(Subscription::market_data("ES"));
    ledger.add(Subscription::market_data("NQ"));
    ledger.add(Subscription::positions("acct-1"));
    ledger.remove(&Subscription::market_data("ES"));
    ledger.add(Subscription::market_data("ES"));

    // Re-adding after removal places the entry at the back.
    let keys: Vec<String> = ledger.snapshot().iter().map(|s| s.key.clone()).collect();
    assert_eq!(keys, vec!["NQ", "acct-1", "ES"]);
}

#[test]
fn subscription_constructors_pick_the_right_channel() {
    assert_eq!(Subscription::market_data("ES").kind.channel(), "market_data");
    assert_eq!(Subscription::orders("a").kind.channel(), "orders");
    assert_eq!(Subscription::positions("a").kind.channel(), "positions");
}

// Frame codec

#[test]
fn decodes_typed_update_frames() {
    let order = r#"{"type":"order_update","data":{
        "id":"o-1","symbol":"ES","type":"limit","side":"buy","quantity":"2",
        "price":"5000.25","stop_price":null,"limit_price":"5000.25",
        "status":"working","created_at":"2026-01-15T14:30:00Z"}}"#;
    match decode_frame(order).unwrap() {
        SessionEvent::OrderUpdate(order) => {
            assert_eq!(order.id, "o-1");
            assert_eq!(order.status, "working");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let position = r#"{"type":"position_update","data":{
        "id":"p-1","symbol":"NQ","side":"long","quantity":"1",
        "entry_price":"18000","current_price":"18010","pnl":"200"}}"#;
    assert!(matches!(
        decode_frame(position).unwrap(),
        SessionEvent::PositionUpdate(_)
    ));
}

#[test]
fn error_frame_passes_payload_through() {
    let text = r#"{"type":"error","data":{"code":"throttled","message":"slow down"}}"#;
    match decode_frame(text).unwrap() {
        SessionEvent::ProtocolError(value) => assert_eq!(value["code"], "throttled"),
        other => panic!("unexpected event: {:?}", other),
    }
}

// Configuration

#[test]
fn environment_urls() {
    assert_eq!(Environment::Demo.rest_base(), "https://api-demo.topstep.com");
    assert_eq!(Environment::Live.rest_base(), "https://api.topstep.com");
    assert!(Environment::Live.stream_url().starts_with("wss://"));
}

#[test]
fn session_config_for_environment_uses_its_stream_url() {
    let config = SessionConfig::for_environment(Environment::Live);
    assert_eq!(config.stream_url, Environment::Live.stream_url());
    assert!(config.validate().is_ok());
}

#[test]
fn reconnect_config_rejects_fractional_multiplier() {
    let reconnect = ReconnectConfig {
        multiplier: 0.5,
        ..ReconnectConfig::default()
    };
    assert!(reconnect.validate().is_err());
}

// Backoff

#[test]
fn backoff_respects_custom_base_and_cap() {
    let config = ReconnectConfig {
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(5),
        multiplier: 3.0,
        jitter_factor: 0.0,
    };
    assert_eq!(backoff(&config, 0), Duration::from_millis(500));
    assert_eq!(backoff(&config, 1), Duration::from_millis(1500));
    assert_eq!(backoff(&config, 2), Duration::from_millis(4500));
    assert_eq!(backoff(&config, 3), Duration::from_secs(5));
}

// Credentials

#[test]
fn credential_lifecycle_values_are_immutable() {
    use projectx_sdk::auth::Credential;

    let expires_at = Utc::now() + ChronoDuration::minutes(10);
    let cred = Credential::new("a", "r", expires_at, "trading account");
    assert_eq!(cred.expires_at(), expires_at);
    assert_eq!(cred.scope(), "trading account");

    // A later value replaces, never mutates: distinct credentials compare
    // unequal even for the same scope.
    let renewed = Credential::new("a2", "r2", expires_at + ChronoDuration::minutes(10), "trading account");
    assert_ne!(cred, renewed);
}

#[test]
fn session_state_display_includes_attempt() {
    assert_eq!(
        SessionState::Reconnecting(3).to_string(),
        "Reconnecting(attempt 3)"
    );
    assert_eq!(SessionState::Live.to_string(), "Live");
}
