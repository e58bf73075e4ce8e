//! In-memory upstreams with scripted answers and call recording.

use crate::mapper::OutboundOrder;
use crate::order::OrderId;
use crate::upstream::{
    FulfillmentApi, NewOrder, NewProduct, ProviderOrder, ProviderProduct, StorefrontApi,
    UpstreamError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::atomics::AtomicU64;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Answers = Mutex<VecDeque<Result<Value, UpstreamError>>>;

fn next_answer(answers: &Answers) -> Result<Value, UpstreamError> {
    answers
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(UpstreamError::Internal("no scripted answer left".into())))
}

/// Webhook body with an id and two line items
pub fn valid_order_body() -> &'static [u8] {
    br#"{
        "id": 1001,
        "email": "jane@example.com",
        "shipping_address": {
            "first_name": "Jane",
            "last_name": "Doe",
            "city": "Utrecht",
            "country_code": "NL"
        },
        "line_items": [
            {"sku": "RTX-4090", "quantity": 1, "title": "Graphics card"},
            {"sku": "", "quantity": 2, "title": "Cable"}
        ]
    }"#
}

#[derive(Default)]
pub struct FakeFulfillment {
    answers: Answers,
    created: Mutex<Vec<OutboundOrder>>,
    products: Mutex<Option<Result<Vec<ProviderProduct>, UpstreamError>>>,
    orders: Mutex<Option<Result<Vec<ProviderOrder>, UpstreamError>>>,
    calls: AtomicUsize,
}

impl FakeFulfillment {
    /// Order creation answers `answers` in turn.
    pub fn answering(answers: Vec<Result<Value, UpstreamError>>) -> Arc<Self> {
        Arc::new(FakeFulfillment {
            answers: Mutex::new(answers.into()),
            ..Default::default()
        })
    }

    pub fn listing_products(products: Result<Vec<ProviderProduct>, UpstreamError>) -> Arc<Self> {
        Arc::new(FakeFulfillment {
            products: Mutex::new(Some(products)),
            ..Default::default()
        })
    }

    pub fn listing_orders(orders: Result<Vec<ProviderOrder>, UpstreamError>) -> Arc<Self> {
        Arc::new(FakeFulfillment {
            orders: Mutex::new(Some(orders)),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn created_orders(&self) -> Vec<OutboundOrder> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl FulfillmentApi for FakeFulfillment {
    async fn create_order(&self, order: &OutboundOrder) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(order.clone());
        next_answer(&self.answers)
    }

    async fn list_products(&self) -> Result<Vec<ProviderProduct>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.products.lock().unwrap().take().unwrap_or(Ok(vec![]))
    }

    async fn list_orders(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<ProviderOrder>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().unwrap().take().unwrap_or(Ok(vec![]))
    }
}

#[derive(Default)]
pub struct FakeStorefront {
    answers: Answers,
    notes: Mutex<Vec<(String, String)>>,
    products: Mutex<Vec<NewProduct>>,
    orders: Mutex<Vec<NewOrder>>,
    calls: AtomicUsize,
}

impl FakeStorefront {
    /// Every call answers `answers` in turn; creations and shop lookups
    /// succeed once the script runs out.
    pub fn answering(answers: Vec<Result<Value, UpstreamError>>) -> Arc<Self> {
        Arc::new(FakeStorefront {
            answers: Mutex::new(answers.into()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn note_updates(&self) -> Vec<(String, String)> {
        self.notes.lock().unwrap().clone()
    }

    pub fn created_products(&self) -> Vec<NewProduct> {
        self.products.lock().unwrap().clone()
    }

    pub fn created_orders(&self) -> Vec<NewOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn next_creation_answer(&self) -> Result<Value, UpstreamError> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"created": true})))
    }
}

#[async_trait]
impl StorefrontApi for FakeStorefront {
    async fn update_order_note(&self, id: &OrderId, note: &str) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.notes
            .lock()
            .unwrap()
            .push((id.to_string(), note.to_string()));
        next_answer(&self.answers)
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.products.lock().unwrap().push(product.clone());
        self.next_creation_answer()
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().unwrap().push(order.clone());
        self.next_creation_answer()
    }

    async fn shop_info(&self) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"shop": {"name": "Fake"}})))
    }
}

/// Recorder that keeps counter totals, keyed by name and sorted labels.
///
/// Install it with [`metrics::with_local_recorder`] around the code under test.
#[derive(Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    fn render(name: &str, labels: &[(&str, &str)]) -> String {
        let mut labels: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        labels.sort();
        format!("{name}{{{}}}", labels.join(","))
    }

    /// Total of the counter `name` with exactly these labels.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(&Self::render(name, labels))
            .map_or(0, |value| value.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let labels: Vec<(&str, &str)> = key.labels().map(|l| (l.key(), l.value())).collect();
        let rendered = Self::render(key.name(), &labels);
        let value = self
            .counters
            .lock()
            .unwrap()
            .entry(rendered)
            .or_default()
            .clone();
        Counter::from_arc(value)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
