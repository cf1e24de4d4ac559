use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

lazy_static::lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tessera_http_requests_total", "Total HTTP requests", &["method", "path", "status"]
    ).unwrap();
    pub static ref DOCUMENTS_WRITTEN_TOTAL: IntCounter = register_int_counter!(
        "tessera_documents_written_total", "Document puts"
    ).unwrap();
    pub static ref DOCUMENTS_DELETED_TOTAL: IntCounter = register_int_counter!(
        "tessera_documents_deleted_total", "Document deletes"
    ).unwrap();
    pub static ref INDEXING_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tessera_indexing_failures_total", "Documents skipped during index backfill", &["index"]
    ).unwrap();
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tessera_queries_total", "Total queries", &["index"]
    ).unwrap();
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "tessera_query_duration_seconds", "Query duration", &["index"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    ).unwrap();
    pub static ref ACTIVE_QUERIES: IntGauge = register_int_gauge!(
        "tessera_active_queries", "Queries currently executing"
    ).unwrap();
    pub static ref DOCUMENTS_STORED: IntGauge = register_int_gauge!(
        "tessera_documents_stored", "Documents in the store at last scrape"
    ).unwrap();
    pub static ref INDEX_DOCUMENTS: IntGaugeVec = register_int_gauge_vec!(
        "tessera_index_documents", "Documents indexed per index at last scrape", &["index"]
    ).unwrap();
}

/// Decrements a gauge when dropped.
pub struct GaugeGuard<'a>(pub &'a IntGauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub fn init() {
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&DOCUMENTS_WRITTEN_TOTAL);
    lazy_static::initialize(&DOCUMENTS_DELETED_TOTAL);
    lazy_static::initialize(&INDEXING_FAILURES_TOTAL);
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&ACTIVE_QUERIES);
    lazy_static::initialize(&DOCUMENTS_STORED);
    lazy_static::initialize(&INDEX_DOCUMENTS);
}
