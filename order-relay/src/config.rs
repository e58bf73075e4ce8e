use crate::retry::RetryPolicy;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Retry policy needs at least one attempt")]
    ZeroAttempts,

    #[error("Attempt timeout cannot be 0")]
    ZeroAttemptTimeout,

    #[error("Storefront shop cannot be empty when no base_url is given")]
    EmptyShop,

    #[error("Invalid storefront URL: {0}")]
    InvalidStorefrontUrl(String),
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for inbound order webhooks
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    pub fulfillment: FulfillmentConfig,
    pub storefront: StorefrontConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Secrets may be left out here and supplied from the environment at startup.
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.retry.validate()?;
        // Only checked when the shop identifier is known, otherwise the
        // per-request pre-flight reports it as a missing credential.
        let shop = self.credentials.storefront_shop.as_deref().unwrap_or_default();
        if self.storefront.base_url.is_some() || !shop.is_empty() {
            self.storefront.admin_url(shop)?;
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Order type tag understood by the fulfillment provider
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Shipped straight to the customer by the provider
    #[default]
    DropShip,
    /// Shipped from stock held at the provider
    Stock,
}

impl OrderType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderType::DropShip => "DS",
            OrderType::Stock => "EX",
        }
    }
}

fn default_fulfillment_url() -> Url {
    Url::parse("https://api.complies.nl/0/").expect("static URL is valid")
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FulfillmentConfig {
    /// Base URL of the provider API; endpoint names are joined onto it
    #[serde(default = "default_fulfillment_url")]
    pub base_url: Url,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub delivery_method: String,
    #[serde(default)]
    pub partial_delivery: bool,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            base_url: default_fulfillment_url(),
            order_type: OrderType::default(),
            delivery_method: String::new(),
            partial_delivery: false,
        }
    }
}

fn default_api_version() -> String {
    "2023-10".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StorefrontConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Overrides the admin API URL derived from the shop identifier
    #[serde(default)]
    pub base_url: Option<Url>,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            base_url: None,
        }
    }
}

impl StorefrontConfig {
    /// Admin API root for `shop`, always ending in a slash so endpoint
    /// names can be joined onto it.
    pub fn admin_url(&self, shop: &str) -> Result<Url, ValidationError> {
        if let Some(url) = &self.base_url {
            return Ok(with_trailing_slash(url.clone()));
        }

        if shop.is_empty() {
            return Err(ValidationError::EmptyShop);
        }

        let raw = format!(
            "https://{shop}.myshopify.com/admin/api/{}/",
            self.api_version
        );
        Url::parse(&raw).map_err(|e| ValidationError::InvalidStorefrontUrl(e.to_string()))
    }
}

/// Makes `url` usable as a base for `Url::join` without losing its last segment.
pub fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Deployment secrets. Each one is optional so an incomplete deployment can
/// still start and report exactly what is missing on every request.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Credentials {
    pub fulfillment_email: Option<String>,
    pub fulfillment_token: Option<String>,
    pub storefront_api_key: Option<String>,
    pub storefront_shop: Option<String>,
    pub storefront_access_token: Option<String>,
}

impl Credentials {
    pub const FULFILLMENT_EMAIL: &'static str = "API_EMAIL";
    pub const FULFILLMENT_TOKEN: &'static str = "API_TOKEN";
    pub const STOREFRONT_API_KEY: &'static str = "SHOPIFY_API_KEY";
    pub const STOREFRONT_SHOP: &'static str = "SHOPIFY_SHOP_NAME";
    pub const STOREFRONT_ACCESS_TOKEN: &'static str = "SHOPIFY_ACCESS_TOKEN";

    /// Fills every unset value from `lookup`, keyed by the names above.
    pub fn overlay<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, slot) in self.slots_mut() {
            if slot.as_deref().is_none_or(str::is_empty)
                && let Some(value) = lookup(key)
            {
                *slot = Some(value);
            }
        }
    }

    /// Names of all required keys that are absent or empty, in a fixed order.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        self.slots()
            .into_iter()
            .filter(|(_, value)| value.is_none_or(str::is_empty))
            .map(|(key, _)| key)
            .collect()
    }

    /// Returns the complete set of secrets, or the names of the missing ones.
    pub fn resolve(&self) -> Result<ResolvedCredentials, Vec<&'static str>> {
        let missing = self.missing_keys();
        if !missing.is_empty() {
            return Err(missing);
        }

        let get = |value: &Option<String>| value.clone().unwrap_or_default();
        Ok(ResolvedCredentials {
            fulfillment_email: get(&self.fulfillment_email),
            fulfillment_token: get(&self.fulfillment_token),
            storefront_api_key: get(&self.storefront_api_key),
            storefront_shop: get(&self.storefront_shop),
            storefront_access_token: get(&self.storefront_access_token),
        })
    }

    fn slots(&self) -> [(&'static str, Option<&str>); 5] {
        [
            (Self::FULFILLMENT_EMAIL, self.fulfillment_email.as_deref()),
            (Self::FULFILLMENT_TOKEN, self.fulfillment_token.as_deref()),
            (Self::STOREFRONT_API_KEY, self.storefront_api_key.as_deref()),
            (Self::STOREFRONT_SHOP, self.storefront_shop.as_deref()),
            (
                Self::STOREFRONT_ACCESS_TOKEN,
                self.storefront_access_token.as_deref(),
            ),
        ]
    }

    fn slots_mut(&mut self) -> [(&'static str, &mut Option<String>); 5] {
        [
            (Self::FULFILLMENT_EMAIL, &mut self.fulfillment_email),
            (Self::FULFILLMENT_TOKEN, &mut self.fulfillment_token),
            (Self::STOREFRONT_API_KEY, &mut self.storefront_api_key),
            (Self::STOREFRONT_SHOP, &mut self.storefront_shop),
            (Self::STOREFRONT_ACCESS_TOKEN, &mut self.storefront_access_token),
        ]
    }
}

/// Credentials with every required value present.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCredentials {
    pub fulfillment_email: String,
    pub fulfillment_token: String,
    pub storefront_api_key: String,
    pub storefront_shop: String,
    pub storefront_access_token: String,
}

/// Settings used only by the batch commands
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Storefront product variant attached to orders pulled from the provider
    #[serde(default)]
    pub variant_id: u64,
}
