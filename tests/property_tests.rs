//! Property-based tests using quickcheck

use chrono::{Duration as ChronoDuration, Utc};
use projectx_sdk::{
    auth::Credential,
    config::ReconnectConfig,
    ledger::{Subscription, SubscriptionLedger},
    session::backoff,
};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::time::Duration;

// Expiry: is_expired(now) holds iff now >= expires_at - skew, including at
// the exact boundary.
#[quickcheck]
fn prop_expiry_boundary(offset_secs: i32, skew_secs: u16) -> bool {
    let now = Utc::now();
    let cred = Credential::new(
        "a",
        "r",
        now + ChronoDuration::seconds(i64::from(offset_secs)),
        "trading",
    );
    let skew = Duration::from_secs(u64::from(skew_secs));
    let expected = i64::from(offset_secs) <= i64::from(skew_secs);
    cred.is_expired(now, skew) == expected
}

// Backoff never exceeds the cap and never drops below the initial delay.
#[quickcheck]
fn prop_backoff_bounded(attempt: u32, initial_ms: u16, extra_ms: u16) -> TestResult {
    if initial_ms == 0 {
        return TestResult::discard();
    }
    let config = ReconnectConfig {
        initial_delay: Duration::from_millis(u64::from(initial_ms)),
        max_delay: Duration::from_millis(u64::from(initial_ms) + u64::from(extra_ms)),
        multiplier: 2.0,
        jitter_factor: 0.0,
    };
    let delay = backoff(&config, attempt);
    TestResult::from_bool(delay >= config.initial_delay && delay <= config.max_delay)
}

// Backoff is monotonically non-decreasing in the attempt count.
#[quickcheck]
fn prop_backoff_monotone(attempt: u8) -> bool {
    let config = ReconnectConfig::default();
    backoff(&config, u32::from(attempt)) <= backoff(&config, u32::from(attempt) + 1)
}

// Ledger holds each (kind, key) at most once, as a set would.
#[quickcheck]
fn prop_ledger_is_a_set(keys: Vec<String>) -> bool {
    let mut ledger = SubscriptionLedger::new();
    for key in &keys {
        ledger.add(Subscription::market_data(key));
    }
    let mut unique: Vec<&String> = Vec::new();
    for key in &keys {
        if !unique.contains(&key) {
            unique.push(key);
        }
    }
    let snapshot = ledger.snapshot();
    snapshot.len() == unique.len()
        && snapshot
            .iter()
            .zip(unique.iter())
            .all(|(sub, key)| sub.key == **key)
}

// Add-then-remove round trips to the original ledger content.
#[quickcheck]
fn prop_ledger_remove_inverts_add(existing: Vec<String>, key: String) -> TestResult {
    if existing.contains(&key) {
        return TestResult::discard();
    }
    let mut ledger = SubscriptionLedger::new();
    for k in &existing {
        ledger.add(Subscription::market_data(k));
    }
    let before = ledger.snapshot();

    ledger.add(Subscription::market_data(&key));
    ledger.remove(&Subscription::market_data(&key));

    TestResult::from_bool(ledger.snapshot() == before)
}
