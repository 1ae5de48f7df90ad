use anyhow::Result;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};
use std::time::Duration;
use tracing::{info, warn};

use crate::settings::TelemetrySettings;

const SERVICE_NAME: &str = "push-dispatch-server";

/// Installs the global meter provider exporting to the configured OTLP
/// endpoint. Without an endpoint counters stay unexported.
///
/// Must run before the metrics registry is initialized, instruments created
/// earlier are bound to the no-op provider.
pub fn init_meter_provider(settings: &TelemetrySettings) -> Result<Option<SdkMeterProvider>> {
    let Some(endpoint) = &settings.otlp_endpoint else {
        info!("No OTLP endpoint configured, metrics are not exported");
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(format!("{}/v1/metrics", endpoint.trim_end_matches('/')))
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(settings.export_interval_secs))
        .build();
    let resource = Resource::builder().with_service_name(SERVICE_NAME).build();
    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    global::set_meter_provider(provider.clone());
    info!(%endpoint, "Exporting metrics over OTLP");

    Ok(Some(provider))
}

/// Flushes and stops the exporter.
pub fn shutdown_meter_provider(provider: SdkMeterProvider) {
    if let Err(err) = provider.shutdown() {
        warn!(error = %err, "Failed to shut down the meter provider");
    }
}
