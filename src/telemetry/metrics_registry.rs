use lazy_static::lazy_static;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Meter},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::devices::entities::GatewayKind;

// Struct to hold all metrics
#[derive(Clone)]
pub struct PushMetrics {
    #[allow(dead_code)]
    meter: Meter,
    pub notifications_sent: Counter<u64>,
    pub delivery_failures: Counter<u64>,
    pub devices_deactivated: Counter<u64>,
}

impl Default for PushMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PushMetrics {
    pub fn new() -> Self {
        info!("Initializing push metrics registry");
        Self::with_meter(global::meter("push_dispatch"))
    }

    pub fn with_meter(meter: Meter) -> Self {
        let prefix = "push_dispatch_";

        let notifications_sent = meter
            .u64_counter(format!("{}notifications_sent_total", prefix))
            .with_description("Notifications accepted by a gateway")
            .build();
        let delivery_failures = meter
            .u64_counter(format!("{}delivery_failures_total", prefix))
            .with_description("Notifications rejected by a gateway")
            .build();
        let devices_deactivated = meter
            .u64_counter(format!("{}devices_deactivated_total", prefix))
            .with_description("Devices deactivated after a permanent gateway failure")
            .build();

        PushMetrics {
            meter,
            notifications_sent,
            delivery_failures,
            devices_deactivated,
        }
    }

    pub fn record_sent(&self, gateway: GatewayKind, count: u64) {
        self.notifications_sent
            .add(count, &[KeyValue::new("gateway", gateway.as_str())]);
    }

    pub fn record_failure(&self, gateway: GatewayKind, reason: &str, permanent: bool) {
        self.delivery_failures.add(
            1,
            &[
                KeyValue::new("gateway", gateway.as_str()),
                KeyValue::new("reason", reason.to_string()),
                KeyValue::new("permanent", permanent),
            ],
        );
    }

    pub fn record_deactivated(&self, gateway: GatewayKind, count: u64) {
        self.devices_deactivated
            .add(count, &[KeyValue::new("gateway", gateway.as_str())]);
    }
}

// Global instance of PushMetrics
lazy_static! {
    static ref METRICS: Mutex<Option<Arc<PushMetrics>>> = Mutex::new(None);
}

// Initialize the global metrics instance
pub fn init_metrics_registry() {
    let mut metrics = METRICS.lock();
    if metrics.is_none() {
        *metrics = Some(Arc::new(PushMetrics::new()));
        info!("Push metrics registry initialized");
    }
}

// Get a reference to the metrics registry
pub fn get_metrics() -> Option<Arc<PushMetrics>> {
    match METRICS.try_lock() {
        Some(guard) => guard.clone(),
        None => {
            tracing::warn!("Failed to acquire lock for metrics registry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};

    #[test]
    fn test_counters_reach_the_exporter() {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();

        let metrics = PushMetrics::with_meter(provider.meter("push_dispatch"));
        metrics.record_sent(GatewayKind::Apns, 2);
        metrics.record_failure(GatewayKind::Gcm, "NotRegistered", true);
        metrics.record_deactivated(GatewayKind::Gcm, 1);
        provider.force_flush().unwrap();

        let exported = exporter.get_finished_metrics().unwrap();
        assert!(!exported.is_empty());
        provider.shutdown().unwrap();
    }
}
