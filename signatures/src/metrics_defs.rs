//! Metrics definitions for the signature service.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

pub const UPSTREAM_RETRIES: MetricDef = MetricDef {
    name: "upstream.retries",
    metric_type: MetricType::Counter,
    description: "Number of upstream requests that were retried after a transient failure",
};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of requests served from the fresh cache slot",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of requests that found the cache empty or stale",
};

pub const SUBMISSIONS_SKIPPED: MetricDef = MetricDef {
    name: "enrich.skipped",
    metric_type: MetricType::Counter,
    description: "Number of submissions dropped because no person could be resolved",
};

pub const FETCH_DURATION: MetricDef = MetricDef {
    name: "fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a full submissions fetch in seconds",
};

pub const FETCH_RECORDS: MetricDef = MetricDef {
    name: "fetch.records",
    metric_type: MetricType::Histogram,
    description: "Number of merged records produced by a full fetch",
};

pub const FETCH_PAGES: MetricDef = MetricDef {
    name: "fetch.pages",
    metric_type: MetricType::Histogram,
    description: "Number of submission pages walked by a full fetch",
};

pub const ALL_METRICS: &[MetricDef] = &[
    UPSTREAM_RETRIES,
    CACHE_HIT,
    CACHE_MISS,
    SUBMISSIONS_SKIPPED,
    FETCH_DURATION,
    FETCH_RECORDS,
    FETCH_PAGES,
];
