//! REST collaborator: thin bearer-authenticated wrappers for the account,
//! order, position and market-data resources.
//!
//! Every call fetches the access token from the shared [`CredentialStore`],
//! which silently refreshes an expired credential first. Resource payloads
//! are passed through unchanged; this module carries no business semantics.

use crate::{
    auth::CredentialStore,
    data::{Account, MarketData, NewOrder, Order, Position},
    error::{SdkError, TransportError},
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// REST client for the brokerage API
pub struct RestClient {
    base_url: String,
    store: Arc<CredentialStore>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct AccountsEnvelope {
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct OrdersEnvelope {
    orders: Vec<Order>,
}

#[derive(Deserialize)]
struct PositionsEnvelope {
    positions: Vec<Position>,
}

#[derive(Deserialize)]
struct QuotesEnvelope {
    quotes: Vec<MarketData>,
}

impl RestClient {
    pub fn new(base_url: &str, store: Arc<CredentialStore>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_accounts(&self) -> Result<Vec<Account>, SdkError> {
        let envelope: AccountsEnvelope = self.get("/accounts", &[]).await?;
        Ok(envelope.accounts)
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Account, SdkError> {
        self.get(&format!("/accounts/{}", account_id), &[]).await
    }

    pub async fn get_orders(&self, account_id: &str) -> Result<Vec<Order>, SdkError> {
        let envelope: OrdersEnvelope = self
            .get(&format!("/accounts/{}/orders", account_id), &[])
            .await?;
        Ok(envelope.orders)
    }

    pub async fn create_order(&self, account_id: &str, order: &NewOrder) -> Result<Order, SdkError> {
        let url = format!("{}/accounts/{}/orders", self.base_url, account_id);
        let token = self.store.bearer_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(order)
            .send()
            .await
            .map_err(|e| SdkError::Transport(TransportError::Io(e.to_string())))?;
        Self::decode(response).await
    }

    pub async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<(), SdkError> {
        self.delete(&format!("/accounts/{}/orders/{}", account_id, order_id))
            .await
    }

    pub async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>, SdkError> {
        let envelope: PositionsEnvelope = self
            .get(&format!("/accounts/{}/positions", account_id), &[])
            .await?;
        Ok(envelope.positions)
    }

    pub async fn close_position(
        &self,
        account_id: &str,
        position_id: &str,
    ) -> Result<(), SdkError> {
        self.delete(&format!("/accounts/{}/positions/{}", account_id, position_id))
            .await
    }

    pub async fn get_market_data(&self, symbols: &[&str]) -> Result<Vec<MarketData>, SdkError> {
        let joined = symbols.join(",");
        let envelope: QuotesEnvelope = self
            .get("/market-data", &[("symbols", joined.as_str())])
            .await?;
        Ok(envelope.quotes)
    }

    async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, SdkError> {
        let token = self.store.bearer_token().await?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SdkError::Transport(TransportError::Io(e.to_string())))?;
        Self::decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), SdkError> {
        let token = self.store.bearer_token().await?;
        let response = self
            .http
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SdkError::Transport(TransportError::Io(e.to_string())))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SdkError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, SdkError> {
        let status = response.status();
        if !status.is_success() {
            return Err(SdkError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response.json().await.map_err(|e| {
            SdkError::Decode(crate::error::DecodeError::InvalidJson(e.to_string()))
        })
    }
}
