use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec,
};

pub static PAGER_PAGE_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        // metric name
        "pagebound_page_latency_seconds",
        // metric description
        "Pagebound time to assemble one page",
        // metric labels (dimensions)
        &["table_name"],
        exponential_buckets(/*start=*/ 1e-6, /*factor=*/ 2.0, /*count=*/ 24).unwrap(),
    )
    .unwrap()
});

pub static PAGER_CHUNK_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pagebound_chunk_fetches",
        "Pagebound chunked scan calls",
        &["table_name"]
    )
    .unwrap()
});

pub static PAGER_PAGE_EDGES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_page_edges",
        "Pagebound edges returned per page",
        &["table_name"],
        exponential_buckets(/*start=*/ 1.0, /*factor=*/ 2.0, /*count=*/ 16).unwrap(),
    )
    .unwrap()
});

pub static PAGER_REQUEST_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pagebound_request_errors",
        "Pagebound failed page requests",
        &["kind"]
    )
    .unwrap()
});

pub static STORE_SCAN_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_store_scan_latency_seconds",
        "Pagebound table store chunk scan latency",
        &["store_name"],
        exponential_buckets(/*start=*/ 1e-6, /*factor=*/ 2.0, /*count=*/ 22).unwrap(),
    )
    .unwrap()
});

pub static STORE_SCAN_ITEMS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pagebound_store_scan_items",
        "Pagebound table store items evaluated per chunk",
        &["store_name"],
        exponential_buckets(/*start=*/ 1.0, /*factor=*/ 2.0, /*count=*/ 16).unwrap(),
    )
    .unwrap()
});
