//! # ProjectX SDK
//!
//! Client-side session manager for a brokerage trading platform. Unifies
//! the lifecycle of an OAuth2-style bearer credential (expiry detection,
//! silent renewal) with a long-lived streaming connection that survives
//! network interruption, preserves subscription state across reconnects,
//! and delivers typed push events in arrival order.
//!
//! ## Quick Start
//! ```rust,ignore
//! use projectx_sdk::prelude::*;
//!
//! let client = ProjectXClient::new(AuthConfig::from_env()?)?;
//! client.authenticate("authorization-code").await?;
//!
//! client.on_market_data(|quote| println!("{}", quote));
//! client.subscribe_market_data(&["ES", "NQ"]);
//! client.connect_stream().await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod frames;
pub mod ledger;
pub mod rest;
pub mod session;
pub mod transport;

pub use auth::{AuthClient, Credential, CredentialStore, TokenRefresher, DEFAULT_EXPIRY_SKEW};
pub use client::ProjectXClient;
pub use config::{AuthConfig, Environment, ReconnectConfig, SessionConfig};
pub use data::*;
pub use error::*;
pub use events::{CallbackId, EventDispatcher};
pub use frames::OutboundFrame;
pub use ledger::{Subscription, SubscriptionKind, SubscriptionLedger};
pub use session::{backoff, backoff_with_jitter, SessionManager};

/// Prelude - minimal public API surface
///
/// Import with: `use projectx_sdk::prelude::*;`
pub mod prelude {
    /// Main entry point
    pub use crate::client::ProjectXClient;

    /// Configuration
    pub use crate::config::{AuthConfig, Environment, ReconnectConfig, SessionConfig};

    /// Credentials
    pub use crate::auth::Credential;

    /// Subscriptions
    pub use crate::ledger::{Subscription, SubscriptionKind};

    /// Core data types
    pub use crate::data::{
        Account, EventKind, MarketData, NewOrder, Order, Position, SessionEvent, SessionState,
    };

    /// Errors
    pub use crate::error::SdkError;
}

/// Initialize logging for the SDK
pub fn init_logging() {
    tracing_subscriber::fmt::init();
}
