use super::{FulfillmentApi, UpstreamError, read_json};
use crate::config::with_trailing_slash;
use crate::mapper::OutboundOrder;
use crate::metrics_defs::INVALID_RECORDS;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use shared::counter;
use url::Url;

/// Catalogue entry as listed by the provider.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderProduct {
    #[serde(deserialize_with = "lenient_string")]
    pub itemcode: String,
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub longdescription: String,
    #[serde(deserialize_with = "lenient_string")]
    pub brand: String,
    pub tags: Option<String>,
    pub productimage: Option<String>,
    pub totalprice: f64,
    pub suggestprice: f64,
    pub barcode: Option<String>,
    pub stockfree: Option<i64>,
    #[serde(deserialize_with = "lenient_string")]
    pub categoryname2: String,
}

/// Order as listed by the provider. Only the fields needed to recreate it
/// on the storefront are kept.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderOrder {
    #[serde(deserialize_with = "lenient_string")]
    pub ordernr: String,
    #[serde(deserialize_with = "lenient_string")]
    pub orderref: String,
    pub status: String,
    pub quantity: u64,
    pub orderedbyname: String,
    pub orderedbyaddress: String,
    pub orderedbycity: String,
    #[serde(deserialize_with = "lenient_string")]
    pub orderedbyzipcode: String,
    pub orderedbycountry: String,
    pub orderedbyemail: String,
    #[serde(deserialize_with = "lenient_string")]
    pub orderedbyphone: String,
    pub customername: String,
    pub customeraddress: String,
    pub customercity: String,
    #[serde(deserialize_with = "lenient_string")]
    pub customerzipcode: String,
    pub customercountry: String,
    pub customeremail: String,
    #[serde(deserialize_with = "lenient_string")]
    pub customerphone: String,
}

/// Reads a text field that the provider sometimes sends as `null` or as a
/// number.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// HTTP client for the fulfillment provider, authenticated with the account
/// email and API token as basic-auth credentials.
#[derive(Clone)]
pub struct FulfillmentClient {
    client: reqwest::Client,
    base_url: Url,
    email: String,
    token: String,
}

impl FulfillmentClient {
    pub fn new(client: reqwest::Client, base_url: Url, email: String, token: String) -> Self {
        FulfillmentClient {
            client,
            base_url: with_trailing_slash(base_url),
            email,
            token,
        }
    }

    fn endpoint(&self, name: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(name)
            .map_err(|e| UpstreamError::Internal(format!("invalid endpoint {name}: {e}")))
    }

    /// Fetches a listing. Entries that cannot be read are logged and
    /// skipped, the rest are returned.
    async fn get_list<T: DeserializeOwned>(
        &self,
        url: Url,
        listing: &'static str,
    ) -> Result<Vec<T>, UpstreamError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.email, Some(&self.token))
            .send()
            .await?;

        let records = match read_json(response).await? {
            Value::Array(records) => records,
            Value::Null => return Ok(Vec::new()),
            other => {
                return Err(UpstreamError::Internal(format!(
                    "{listing} listing is not an array: {other}"
                )));
            }
        };

        let mut items = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value(record) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(listing, index, error = %e, "Skipping unreadable record");
                    counter!(INVALID_RECORDS, "listing" => listing).increment(1);
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl FulfillmentApi for FulfillmentClient {
    async fn create_order(&self, order: &OutboundOrder) -> Result<Value, UpstreamError> {
        let response = self
            .client
            .post(self.endpoint("neworder")?)
            .basic_auth(&self.email, Some(&self.token))
            .json(order)
            .send()
            .await?;

        read_json(response).await
    }

    async fn list_products(&self) -> Result<Vec<ProviderProduct>, UpstreamError> {
        self.get_list(self.endpoint("getproducts")?, "products").await
    }

    async fn list_orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProviderOrder>, UpstreamError> {
        let mut url = self.endpoint("getorders")?;
        url.query_pairs_mut()
            .append_pair("datefrom", &from.to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("dateto", &to.to_rfc3339_opts(SecondsFormat::Millis, true));

        self.get_list(url, "orders").await
    }
}
