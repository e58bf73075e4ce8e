//! Translation of storefront orders into the fulfillment provider's schema.

use crate::config::{FulfillmentConfig, OrderType};
use crate::order::InboundOrder;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Company name sent when the shipping address has none.
pub const DEFAULT_COMPANY: &str = "-";

/// Order in the shape accepted by the provider's order-creation endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundOrder {
    pub orderref: String,
    #[serde(serialize_with = "serialize_order_type")]
    pub ordertype: OrderType,
    pub deliverymethod: String,
    /// Sent as 0/1
    #[serde(serialize_with = "serialize_flag")]
    pub partialdelivery: bool,
    #[serde(serialize_with = "serialize_timestamp")]
    pub shipmentdate: DateTime<Utc>,
    pub recvcompanyname: String,
    pub recvsurname: String,
    pub recvfirstname: String,
    pub recvinitials: String,
    pub recvstreet: String,
    pub recvhousenr: String,
    pub recvzipcode: String,
    pub recvcity: String,
    pub recvcountry: String,
    pub recvphone: String,
    pub recvemail: String,
    pub items: Vec<OutboundItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundItem {
    pub itemcode: String,
    pub quantity: u64,
}

fn serialize_order_type<S: Serializer>(
    value: &OrderType,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_str())
}

fn serialize_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

fn serialize_timestamp<S: Serializer>(
    value: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Maps `order` onto the provider schema. Never fails: every value the
/// storefront left out becomes its documented default.
pub fn map_order(
    order: &InboundOrder,
    settings: &FulfillmentConfig,
    shipment_date: DateTime<Utc>,
) -> OutboundOrder {
    let address = &order.shipping_address;

    let recvcompanyname = if address.company.is_empty() {
        DEFAULT_COMPANY.to_string()
    } else {
        address.company.clone()
    };

    let recvinitials = address
        .first_name
        .chars()
        .next()
        .map(String::from)
        .unwrap_or_default();

    OutboundOrder {
        orderref: order.id.to_string(),
        ordertype: settings.order_type,
        deliverymethod: settings.delivery_method.clone(),
        partialdelivery: settings.partial_delivery,
        shipmentdate: shipment_date,
        recvcompanyname,
        recvsurname: address.last_name.clone(),
        recvfirstname: address.first_name.clone(),
        recvinitials,
        recvstreet: address.address1.clone(),
        recvhousenr: address.address2.clone(),
        recvzipcode: address.zip.clone(),
        recvcity: address.city.clone(),
        recvcountry: address.country_code.clone(),
        recvphone: address.phone.clone(),
        recvemail: order.email.clone(),
        items: order
            .line_items
            .iter()
            .map(|item| OutboundItem {
                itemcode: item.sku.clone(),
                quantity: item.quantity,
            })
            .collect(),
    }
}
