//! Parsing of the storefront's order-created webhook.
//!
//! The payload is untrusted. It is parsed into a loose shape first and then
//! normalized into an [`InboundOrder`] whose fields are all present, so that
//! mapping never has to deal with missing values.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("request body could not be read: {0}")]
    Unreadable(String),

    #[error("request body is not a valid order: {0}")]
    Malformed(String),

    #[error("order id is missing")]
    MissingId,

    #[error("order has no line items")]
    MissingLineItems,
}

/// Storefront order identifier, kept in the JSON form it arrived in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Number(serde_json::Number),
    Text(String),
}

impl OrderId {
    fn is_blank(&self) -> bool {
        matches!(self, OrderId::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderId::Number(number) => write!(f, "{number}"),
            OrderId::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Deserialize)]
struct RawOrder {
    id: Option<OrderId>,
    email: Option<String>,
    shipping_address: Option<RawAddress>,
    line_items: Option<Vec<RawLineItem>>,
}

#[derive(Deserialize)]
struct RawAddress {
    company: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    address1: Option<String>,
    address2: Option<String>,
    zip: Option<String>,
    city: Option<String>,
    country_code: Option<String>,
    phone: Option<String>,
}

#[derive(Deserialize)]
struct RawLineItem {
    sku: Option<String>,
    quantity: Option<u64>,
    title: Option<String>,
}

/// Shipping address with absent values replaced by empty strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShippingAddress {
    pub company: String,
    pub first_name: String,
    pub last_name: String,
    pub address1: String,
    pub address2: String,
    pub zip: String,
    pub city: String,
    pub country_code: String,
    pub phone: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineItem {
    pub sku: String,
    pub quantity: u64,
    pub title: String,
}

/// A validated order-created notification.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundOrder {
    pub id: OrderId,
    pub email: String,
    /// All fields are empty when the storefront sent no address at all.
    pub shipping_address: ShippingAddress,
    pub line_items: Vec<LineItem>,
}

impl InboundOrder {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PayloadError::EmptyBody);
        }

        let raw: RawOrder =
            serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;

        let id = match raw.id {
            Some(id) if !id.is_blank() => id,
            _ => return Err(PayloadError::MissingId),
        };

        let line_items = match raw.line_items {
            Some(items) if !items.is_empty() => items,
            _ => return Err(PayloadError::MissingLineItems),
        };

        Ok(InboundOrder {
            id,
            email: raw.email.unwrap_or_default(),
            shipping_address: raw
                .shipping_address
                .map(ShippingAddress::from)
                .unwrap_or_default(),
            line_items: line_items.into_iter().map(LineItem::from).collect(),
        })
    }
}

impl From<RawAddress> for ShippingAddress {
    fn from(raw: RawAddress) -> Self {
        ShippingAddress {
            company: raw.company.unwrap_or_default(),
            first_name: raw.first_name.unwrap_or_default(),
            last_name: raw.last_name.unwrap_or_default(),
            address1: raw.address1.unwrap_or_default(),
            address2: raw.address2.unwrap_or_default(),
            zip: raw.zip.unwrap_or_default(),
            city: raw.city.unwrap_or_default(),
            country_code: raw.country_code.unwrap_or_default(),
            phone: raw.phone.unwrap_or_default(),
        }
    }
}

impl From<RawLineItem> for LineItem {
    fn from(raw: RawLineItem) -> Self {
        LineItem {
            sku: raw.sku.unwrap_or_default(),
            quantity: raw.quantity.unwrap_or_default(),
            title: raw.title.unwrap_or_default(),
        }
    }
}
