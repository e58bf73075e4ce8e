use super::{StorefrontApi, UpstreamError, read_json};
use crate::order::OrderId;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductImage {
    pub src: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewVariant {
    pub price: String,
    pub sku: String,
    pub compare_at_price: String,
    pub barcode: String,
    pub inventory_quantity: i64,
    pub inventory_management: String,
    pub inventory_policy: String,
}

/// Product creation payload
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewProduct {
    pub title: String,
    pub body_html: String,
    pub vendor: String,
    pub tags: String,
    pub images: Vec<ProductImage>,
    pub variants: Vec<NewVariant>,
    pub product_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewLineItem {
    pub variant_id: u64,
    pub quantity: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub zip: String,
    pub phone: String,
}

/// Order creation payload
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewOrder {
    pub line_items: Vec<NewLineItem>,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub email: String,
    pub financial_status: String,
}

/// HTTP client for the storefront admin API.
///
/// Requests carry the access token header and, for private apps, the API
/// key and access token as basic-auth credentials.
#[derive(Clone)]
pub struct StorefrontClient {
    client: reqwest::Client,
    admin_url: Url,
    api_key: String,
    access_token: String,
}

impl StorefrontClient {
    /// `admin_url` must end in a slash, see [`crate::config::StorefrontConfig::admin_url`].
    pub fn new(
        client: reqwest::Client,
        admin_url: Url,
        api_key: String,
        access_token: String,
    ) -> Self {
        StorefrontClient {
            client,
            admin_url,
            api_key,
            access_token,
        }
    }

    /// Builds a request for the admin resource at `segments` below the
    /// admin URL. Each segment is percent-encoded, so `/` and `..` inside a
    /// segment never leave it.
    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, UpstreamError> {
        let mut url = self.admin_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Internal(format!("{} cannot be a base", self.admin_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(self
            .client
            .request(method, url)
            .basic_auth(&self.api_key, Some(&self.access_token))
            .header(ACCESS_TOKEN_HEADER, &self.access_token))
    }
}

#[async_trait]
impl StorefrontApi for StorefrontClient {
    async fn update_order_note(&self, id: &OrderId, note: &str) -> Result<Value, UpstreamError> {
        let body = json!({ "order": { "id": id, "note": note } });
        let response = self
            .request(reqwest::Method::PUT, &["orders", format!("{id}.json").as_str()])?
            .json(&body)
            .send()
            .await?;

        read_json(response).await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Value, UpstreamError> {
        let response = self
            .request(reqwest::Method::POST, &["products.json"])?
            .json(&json!({ "product": product }))
            .send()
            .await?;

        read_json(response).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Value, UpstreamError> {
        let response = self
            .request(reqwest::Method::POST, &["orders.json"])?
            .json(&json!({ "order": order }))
            .send()
            .await?;

        read_json(response).await
    }

    async fn shop_info(&self) -> Result<Value, UpstreamError> {
        let response = self
            .request(reqwest::Method::GET, &["shop.json"])?
            .send()
            .await?;

        read_json(response).await
    }
}
