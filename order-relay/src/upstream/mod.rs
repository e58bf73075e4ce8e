//! Remote APIs the relay talks to.
//!
//! Each API sits behind a trait so the handler and the batch flows can be
//! driven against fakes; the production implementations use `reqwest`.

pub mod fulfillment;
pub mod storefront;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::time::error::Elapsed;

use crate::mapper::OutboundOrder;
use crate::order::OrderId;

pub use fulfillment::{FulfillmentClient, ProviderOrder, ProviderProduct};
pub use storefront::{NewOrder, NewProduct, StorefrontClient};

/// Outcome of a single failed remote attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// The remote answered, but not with success
    #[error("upstream responded with {status}")]
    Rejected { status: StatusCode, body: Value },

    /// No response was received (connection failure or timeout)
    #[error("no response from upstream: {0}")]
    Unreachable(String),

    #[error("upstream call failed: {0}")]
    Internal(String),
}

impl From<Elapsed> for UpstreamError {
    fn from(_: Elapsed) -> Self {
        UpstreamError::Unreachable("attempt timed out".to_string())
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_builder() {
            UpstreamError::Internal(e.to_string())
        } else {
            UpstreamError::Unreachable(e.to_string())
        }
    }
}

/// Turns a response into its JSON body, or into `Rejected` for non-2xx statuses.
///
/// Bodies that are not JSON are kept as a JSON string.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, UpstreamError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    if status.is_success() {
        Ok(body)
    } else {
        Err(UpstreamError::Rejected { status, body })
    }
}

/// Operations against the fulfillment provider.
#[async_trait]
pub trait FulfillmentApi: Send + Sync {
    /// Submits a new order and returns the provider's response body.
    async fn create_order(&self, order: &OutboundOrder) -> Result<Value, UpstreamError>;

    /// Lists the provider's product catalogue.
    async fn list_products(&self) -> Result<Vec<ProviderProduct>, UpstreamError>;

    /// Lists orders placed in the given window.
    async fn list_orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProviderOrder>, UpstreamError>;
}

/// Operations against the storefront admin API.
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    /// Replaces the note on an existing order and returns the updated order.
    async fn update_order_note(&self, id: &OrderId, note: &str) -> Result<Value, UpstreamError>;

    async fn create_product(&self, product: &NewProduct) -> Result<Value, UpstreamError>;

    async fn create_order(&self, order: &NewOrder) -> Result<Value, UpstreamError>;

    /// Fetches shop details; used as a connection check.
    async fn shop_info(&self) -> Result<Value, UpstreamError>;
}
