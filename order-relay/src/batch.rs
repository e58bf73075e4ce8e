//! Bulk flows between the provider and the storefront.
//!
//! Both flows push their items one at a time and never fan out, which keeps
//! them under the provider's (undocumented) rate limits. A failed item is
//! logged and skipped; there is no retry and no rollback.

use crate::metrics_defs::BATCH_ITEMS;
use crate::upstream::storefront::{Address, NewLineItem, NewVariant, ProductImage};
use crate::upstream::{
    FulfillmentApi, NewOrder, NewProduct, ProviderOrder, ProviderProduct, StorefrontApi,
};
use chrono::{DateTime, Utc};
use shared::counter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, flow: &'static str, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        let outcome = if ok { "ok" } else { "error" };
        counter!(BATCH_ITEMS, "flow" => flow, "outcome" => outcome).increment(1);
    }
}

/// Logs the storefront's shop details, or why they could not be fetched.
pub async fn check_connection(storefront: &dyn StorefrontApi) -> bool {
    match storefront.shop_info().await {
        Ok(shop) => {
            tracing::info!(shop = %shop, "Connected to storefront");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not connect to storefront");
            false
        }
    }
}

/// Creates a storefront product for every product the provider lists.
pub async fn import_products(
    fulfillment: &dyn FulfillmentApi,
    storefront: &dyn StorefrontApi,
) -> BatchSummary {
    let products = match fulfillment.list_products().await {
        Ok(products) => products,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch products");
            Vec::new()
        }
    };
    tracing::info!(count = products.len(), "Fetched products");

    let mut summary = BatchSummary::default();
    for product in &products {
        let result = storefront.create_product(&translate_product(product)).await;
        match &result {
            Ok(_) => tracing::info!(title = %product.title, "Product added"),
            Err(e) => tracing::error!(
                title = %product.title,
                itemcode = %product.itemcode,
                error = %e,
                "Failed to add product"
            ),
        }
        summary.record("import_products", result.is_ok());
    }

    tracing::info!(?summary, "Product import finished");
    summary
}

/// Recreates the provider's orders from the window `from..to` on the storefront.
///
/// When the provider returns nothing, or the listing fails, the single
/// [`fallback_order`] is pushed instead.
pub async fn fetch_orders(
    fulfillment: &dyn FulfillmentApi,
    storefront: &dyn StorefrontApi,
    variant_id: u64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> BatchSummary {
    let orders = match fulfillment.list_orders(from, to).await {
        Ok(orders) if !orders.is_empty() => {
            tracing::info!(count = orders.len(), "Fetched orders");
            orders
        }
        Ok(_) => {
            tracing::info!("No orders in window, using fallback order");
            vec![fallback_order()]
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch orders, using fallback order");
            vec![fallback_order()]
        }
    };

    let mut summary = BatchSummary::default();
    for order in &orders {
        let result = storefront
            .create_order(&translate_order(order, variant_id))
            .await;
        match &result {
            Ok(_) => tracing::info!(ordernr = %order.ordernr, "Storefront order created"),
            Err(e) => tracing::error!(
                ordernr = %order.ordernr,
                error = %e,
                "Failed to create storefront order"
            ),
        }
        summary.record("fetch_orders", result.is_ok());
    }

    tracing::info!(?summary, "Order fetch finished");
    summary
}

/// Start of the current UTC day up to `now`.
pub fn today_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now);
    (start, now)
}

pub fn translate_product(product: &ProviderProduct) -> NewProduct {
    let images = product
        .productimage
        .iter()
        .filter(|src| !src.is_empty())
        .map(|src| ProductImage { src: src.clone() })
        .collect();

    NewProduct {
        title: product.title.clone(),
        body_html: product.longdescription.clone(),
        vendor: product.brand.clone(),
        tags: product.tags.clone().unwrap_or_default(),
        images,
        variants: vec![NewVariant {
            price: format!("{:.2}", product.totalprice),
            sku: product.itemcode.clone(),
            compare_at_price: format!("{:.2}", product.suggestprice),
            barcode: product.barcode.clone().unwrap_or_default(),
            inventory_quantity: product.stockfree.unwrap_or(0),
            inventory_management: "shopify".to_string(),
            inventory_policy: "deny".to_string(),
        }],
        product_type: product.categoryname2.clone(),
    }
}

/// Splits "First Rest Of Name" into ("First", "Rest Of Name").
fn split_name(full_name: &str) -> (String, String) {
    let full_name = full_name.trim();
    match full_name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full_name.to_string(), String::new()),
    }
}

pub fn translate_order(order: &ProviderOrder, variant_id: u64) -> NewOrder {
    let (billing_first, billing_last) = split_name(&order.orderedbyname);
    let (shipping_first, shipping_last) = split_name(&order.customername);

    NewOrder {
        line_items: vec![NewLineItem {
            variant_id,
            quantity: order.quantity,
        }],
        billing_address: Address {
            first_name: billing_first,
            last_name: billing_last,
            address1: order.orderedbyaddress.clone(),
            city: order.orderedbycity.clone(),
            province: String::new(),
            country: order.orderedbycountry.clone(),
            zip: order.orderedbyzipcode.clone(),
            phone: order.orderedbyphone.clone(),
        },
        shipping_address: Address {
            first_name: shipping_first,
            last_name: shipping_last,
            address1: order.customeraddress.clone(),
            city: order.customercity.clone(),
            province: String::new(),
            country: order.customercountry.clone(),
            zip: order.customerzipcode.clone(),
            phone: order.customerphone.clone(),
        },
        email: order.customeremail.clone(),
        financial_status: "paid".to_string(),
    }
}

/// Fixed test record pushed when the provider has no orders to offer.
pub fn fallback_order() -> ProviderOrder {
    ProviderOrder {
        ordernr: "34851564".to_string(),
        orderref: "Webshop#1234".to_string(),
        status: "APPROVED".to_string(),
        quantity: 1,
        orderedbyname: "John Doe".to_string(),
        orderedbyaddress: "123 Test Street".to_string(),
        orderedbycity: "Test City".to_string(),
        orderedbyzipcode: "1234AA".to_string(),
        orderedbycountry: "NL".to_string(),
        orderedbyemail: "john@example.com".to_string(),
        orderedbyphone: "123456789".to_string(),
        customername: "Jane Doe".to_string(),
        customeraddress: "456 Test Avenue".to_string(),
        customercity: "Test City".to_string(),
        customerzipcode: "1234AA".to_string(),
        customercountry: "NL".to_string(),
        customeremail: "jane@example.com".to_string(),
        customerphone: "123456789".to_string(),
    }
}
