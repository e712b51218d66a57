//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::RoutingMode;

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Campaign progress
    describe_gauge!("sol_volume_bot_accumulated_volume", "Confirmed volume in quote units");
    describe_gauge!("sol_volume_bot_target_volume", "Current target volume in quote units");
    describe_gauge!("sol_volume_bot_campaign_state", "Campaign state (0 idle, 1 running, 2 completed, 3 aborted)");
    describe_gauge!("sol_volume_bot_wallets", "Wallets in rotation");

    // Cycles
    describe_counter!("sol_volume_bot_cycles_total", "Cycles attempted");
    describe_counter!("sol_volume_bot_cycles_success", "Cycles confirmed");
    describe_counter!("sol_volume_bot_cycles_failed", "Cycles that failed");
    describe_counter!("sol_volume_bot_swaps_total", "Swaps submitted, by routing mode");

    // Latency
    describe_histogram!("sol_volume_bot_cycle_latency_ms", "Cycle duration excluding pacing");
    describe_histogram!("sol_volume_bot_submit_latency_ms", "Send and confirm latency");
}

pub fn record_volume(accumulated: f64, target: f64) {
    gauge!("sol_volume_bot_accumulated_volume").set(accumulated);
    gauge!("sol_volume_bot_target_volume").set(target);
}

pub fn record_campaign_state(state: u8) {
    gauge!("sol_volume_bot_campaign_state").set(state as f64);
}

pub fn record_wallet_count(count: usize) {
    gauge!("sol_volume_bot_wallets").set(count as f64);
}

pub fn record_cycle_success(latency_ms: f64) {
    counter!("sol_volume_bot_cycles_total").increment(1);
    counter!("sol_volume_bot_cycles_success").increment(1);
    histogram!("sol_volume_bot_cycle_latency_ms").record(latency_ms);
}

pub fn record_cycle_failure(latency_ms: f64) {
    counter!("sol_volume_bot_cycles_total").increment(1);
    counter!("sol_volume_bot_cycles_failed").increment(1);
    histogram!("sol_volume_bot_cycle_latency_ms").record(latency_ms);
}

pub fn record_swap(mode: RoutingMode) {
    counter!("sol_volume_bot_swaps_total", "mode" => mode.to_string()).increment(1);
}

pub fn record_submit_latency(latency_ms: f64) {
    histogram!("sol_volume_bot_submit_latency_ms").record(latency_ms);
}
