//! Subscription ledger: the set of subscriptions the session intends to
//! maintain, replayed in insertion order after every reconnect.

use std::fmt;

/// Channel family of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    MarketData,
    OrderChannel,
    PositionChannel,
}

impl SubscriptionKind {
    /// Wire name of the channel
    pub fn channel(&self) -> &'static str {
        match self {
            SubscriptionKind::MarketData => "market_data",
            SubscriptionKind::OrderChannel => "orders",
            SubscriptionKind::PositionChannel => "positions",
        }
    }
}

/// A subscription intent, keyed by `(kind, key)`. The key is a symbol for
/// market data and an account id for order/position channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub kind: SubscriptionKind,
    pub key: String,
}

impl Subscription {
    pub fn market_data(symbol: &str) -> Self {
        Self {
            kind: SubscriptionKind::MarketData,
            key: symbol.to_string(),
        }
    }

    pub fn orders(account_id: &str) -> Self {
        Self {
            kind: SubscriptionKind::OrderChannel,
            key: account_id.to_string(),
        }
    }

    pub fn positions(account_id: &str) -> Self {
        Self {
            kind: SubscriptionKind::PositionChannel,
            key: account_id.to_string(),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.channel(), self.key)
    }
}

/// Insertion-ordered set of active subscriptions.
///
/// Purely in-memory; owned by the session manager and mutated only through
/// its subscribe/unsubscribe operations. Survives reconnects and
/// `disconnect()`, which is what makes reconnect resume prior subscriptions
/// transparently.
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    entries: Vec<Subscription>,
}

impl SubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription intent. Returns `false` if already present
    /// (idempotent add).
    pub fn add(&mut self, subscription: Subscription) -> bool {
        if self.entries.contains(&subscription) {
            return false;
        }
        self.entries.push(subscription);
        true
    }

    /// Remove a subscription intent. Removing an absent entry is a no-op;
    /// returns whether anything was removed.
    pub fn remove(&mut self, subscription: &Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s != subscription);
        self.entries.len() < before
    }

    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.entries.contains(subscription)
    }

    /// Current subscriptions in insertion order, for deterministic replay.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut ledger = SubscriptionLedger::new();
        assert!(ledger.add(Subscription::market_data("ES")));
        assert!(!ledger.add(Subscription::market_data("ES")));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut ledger = SubscriptionLedger::new();
        assert!(!ledger.remove(&Subscription::orders("acct-1")));
        ledger.add(Subscription::orders("acct-1"));
        assert!(ledger.remove(&Subscription::orders("acct-1")));
        assert!(ledger.is_empty());
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let mut ledger = SubscriptionLedger::new();
        ledger.add(Subscription::market_data("ES"));
        ledger.add(Subscription::orders("acct-1"));
        ledger.add(Subscription::market_data("NQ"));

        let snap = ledger.snapshot();
        assert_eq!(
            snap,
            vec![
                Subscription::market_data("ES"),
                Subscription::orders("acct-1"),
                Subscription::market_data("NQ"),
            ]
        );
    }

    #[test]
    fn same_key_different_kind_are_distinct() {
        let mut ledger = SubscriptionLedger::new();
        ledger.add(Subscription::orders("acct-1"));
        ledger.add(Subscription::positions("acct-1"));
        assert_eq!(ledger.len(), 2);
    }
}
