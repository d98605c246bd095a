// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// Without the observability feature the macros only evaluate their arguments
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = ($name, $value);
        $(let _ = ($label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = ($name, $value);
        $(let _ = ($label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = ($name, $value);
        $(let _ = ($label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {{
        let _ = ($name, $desc);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {{
        let _ = ($name, $desc);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {{
        let _ = ($name, $desc);
    }};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use std::time::Duration;

/// Registers descriptions for every metric. Call once at startup.
pub fn describe_metrics() {
    describe_counter!("rpc_calls_total", "RPC round trips by chain, method and outcome.");
    describe_histogram!("rpc_call_latency_ms", "RPC round-trip latency in milliseconds.");
    describe_counter!(
        "log_chunks_omitted_total",
        "Log chunks skipped after exhausting their attempts."
    );
    describe_counter!(
        "address_checks_unresolved_total",
        "Code lookups that exhausted retries and defaulted to non-contract."
    );
    describe_counter!("pool_prices_omitted_total", "Pools left out of the price list, by reason.");
    describe_counter!("chain_refresh_total", "Per-chain pipeline runs by mode and outcome.");
    describe_histogram!("chain_refresh_duration_ms", "Per-chain pipeline run duration.");
    describe_gauge!("reference_rate", "Reference fiat rate used for theoretical prices.");
}

pub fn record_rpc_call(chain: &str, method: &'static str, duration: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(
        "rpc_calls_total",
        1,
        "chain" => chain.to_string(),
        "method" => method,
        "outcome" => outcome
    );
    histogram!(
        "rpc_call_latency_ms",
        duration.as_secs_f64() * 1000.0,
        "chain" => chain.to_string(),
        "method" => method
    );
}

pub fn increment_omitted_chunk(chain: &str) {
    counter!("log_chunks_omitted_total", 1, "chain" => chain.to_string());
}

pub fn increment_unresolved_address(chain: &str) {
    counter!("address_checks_unresolved_total", 1, "chain" => chain.to_string());
}

pub fn increment_omitted_price(chain: &str, reason: &'static str) {
    counter!(
        "pool_prices_omitted_total",
        1,
        "chain" => chain.to_string(),
        "reason" => reason
    );
}

pub fn record_chain_refresh(chain: &str, mode: &'static str, ok: bool, duration: Duration) {
    let outcome = if ok { "success" } else { "failure" };
    counter!(
        "chain_refresh_total",
        1,
        "chain" => chain.to_string(),
        "mode" => mode,
        "outcome" => outcome
    );
    histogram!(
        "chain_refresh_duration_ms",
        duration.as_secs_f64() * 1000.0,
        "chain" => chain.to_string(),
        "mode" => mode
    );
}

pub fn set_reference_rate(value: f64, source: &'static str) {
    gauge!("reference_rate", value, "source" => source);
}
