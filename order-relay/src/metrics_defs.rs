use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "relay.request.duration",
    metric_type: MetricType::Histogram,
    description: "Webhook handling duration in seconds. Tagged with status.",
};

pub const ORDERS: MetricDef = MetricDef {
    name: "relay.orders",
    metric_type: MetricType::Counter,
    description: "Relayed orders by outcome (ok, rejected, unreachable, partial, invalid, ...)",
};

pub const UPSTREAM_ATTEMPTS: MetricDef = MetricDef {
    name: "upstream.attempts",
    metric_type: MetricType::Counter,
    description: "Individual remote call attempts. Tagged with operation, outcome.",
};

pub const BATCH_ITEMS: MetricDef = MetricDef {
    name: "batch.items",
    metric_type: MetricType::Counter,
    description: "Items pushed by batch flows. Tagged with flow, outcome.",
};

pub const INVALID_RECORDS: MetricDef = MetricDef {
    name: "upstream.invalid_records",
    metric_type: MetricType::Counter,
    description: "Unreadable provider list entries that were skipped. Tagged with listing.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    ORDERS,
    UPSTREAM_ATTEMPTS,
    BATCH_ITEMS,
    INVALID_RECORDS,
];
