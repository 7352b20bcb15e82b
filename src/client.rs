//! High-level client facade: OAuth flow, REST access and the streaming
//! session behind one constructor.

use crate::{
    auth::{AuthClient, Credential, CredentialStore, TokenRefresher},
    config::{AuthConfig, SessionConfig},
    data::{EventKind, MarketData, Order, Position, SessionEvent, SessionState},
    error::SdkError,
    events::CallbackId,
    ledger::Subscription,
    rest::RestClient,
    session::SessionManager,
    transport::WsTransport,
};
use std::sync::Arc;
use url::Url;

/// Brokerage client: authentication, REST resources and the streaming
/// session share one credential store, so a token refreshed anywhere is
/// visible everywhere.
pub struct ProjectXClient {
    auth: Arc<AuthClient>,
    store: Arc<CredentialStore>,
    rest: RestClient,
    session: SessionManager<WsTransport>,
}

impl ProjectXClient {
    pub fn new(config: AuthConfig) -> Result<Self, SdkError> {
        let session_config = SessionConfig::for_environment(config.environment);
        Self::with_session_config(config, session_config)
    }

    pub fn with_session_config(
        config: AuthConfig,
        session_config: SessionConfig,
    ) -> Result<Self, SdkError> {
        config.validate()?;
        session_config.validate()?;

        let auth = Arc::new(AuthClient::new(config));
        let refresher: Arc<dyn TokenRefresher> = auth.clone();
        let store = Arc::new(CredentialStore::new(refresher, session_config.expiry_skew));
        let rest = RestClient::new(auth.base_url(), Arc::clone(&store));
        let transport = WsTransport::new(session_config.connect_timeout);
        let session = SessionManager::new(session_config, Arc::clone(&store), transport)?;

        Ok(Self {
            auth,
            store,
            rest,
            session,
        })
    }

    // ===== Authentication =====

    /// URL the user visits to grant access
    pub fn authorize_url(&self) -> Result<Url, SdkError> {
        Ok(self.auth.authorize_url()?)
    }

    /// Exchange an authorization code for a credential and install it
    pub async fn authenticate(&self, code: &str) -> Result<Credential, SdkError> {
        let credential = self.auth.exchange_code(code).await?;
        self.store.set_credential(credential.clone());
        Ok(credential)
    }

    /// Install a credential obtained elsewhere (e.g. persisted by the caller)
    pub fn set_credential(&self, credential: Credential) {
        self.store.set_credential(credential);
    }

    pub fn credential(&self) -> Option<Credential> {
        self.store.credential()
    }

    /// Drop the credential and stop the stream
    pub fn logout(&self) {
        self.session.disconnect();
        self.store.clear();
    }

    // ===== REST resources (pass-through) =====

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    // ===== Streaming session =====

    /// Start the streaming session
    pub async fn connect_stream(&self) -> Result<(), SdkError> {
        self.session.connect().await
    }

    /// Stop the streaming session; subscriptions are kept for the next
    /// `connect_stream()`
    pub fn disconnect_stream(&self) {
        self.session.disconnect();
    }

    pub fn stream_state(&self) -> SessionState {
        self.session.state()
    }

    /// The underlying session manager, for ledger-level control
    pub fn session(&self) -> &SessionManager<WsTransport> {
        &self.session
    }

    pub fn subscribe_market_data(&self, symbols: &[&str]) {
        for symbol in symbols {
            self.session.subscribe(Subscription::market_data(symbol));
        }
    }

    pub fn subscribe_orders(&self, account_id: &str) {
        self.session.subscribe(Subscription::orders(account_id));
    }

    pub fn subscribe_positions(&self, account_id: &str) {
        self.session.subscribe(Subscription::positions(account_id));
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.session.unsubscribe(subscription);
    }

    // ===== Observers =====

    pub fn on_market_data<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&MarketData) + Send + Sync + 'static,
    {
        self.session.on(
            EventKind::MarketData,
            Arc::new(move |event| {
                if let SessionEvent::MarketData(quote) = event {
                    callback(quote);
                }
            }),
        )
    }

    pub fn on_order_update<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Order) + Send + Sync + 'static,
    {
        self.session.on(
            EventKind::OrderUpdate,
            Arc::new(move |event| {
                if let SessionEvent::OrderUpdate(order) = event {
                    callback(order);
                }
            }),
        )
    }

    pub fn on_position_update<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Position) + Send + Sync + 'static,
    {
        self.session.on(
            EventKind::PositionUpdate,
            Arc::new(move |event| {
                if let SessionEvent::PositionUpdate(position) = event {
                    callback(position);
                }
            }),
        )
    }

    pub fn on_error<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&SdkError) + Send + Sync + 'static,
    {
        self.session.on_error(Arc::new(callback))
    }

    pub fn on_state_change<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.session.on_state_change(Arc::new(callback))
    }
}
