pub mod exporter;
pub mod metrics_registry;
