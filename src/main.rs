mod context;
mod database;
mod devices;
mod notifications;
mod settings;
mod telemetry;
mod webserver;

use anyhow::Result;
use clap::{Parser, Subcommand};
use context::AppContext;
use devices::entities::GatewayKind;
use notifications::entities::{Notification, SendOptions};
use settings::Settings;
use std::path::PathBuf;
use tokio::spawn;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "push-dispatch-server", version, about = "Push notification dispatch server")]
struct Cli {
    /// Settings file, `settings.toml` in the working directory by default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the operator console HTTP API
    Serve,

    /// Send a notification to registered devices and print the report
    Send {
        #[arg(short, long, value_enum)]
        gateway: GatewayKind,

        /// Registration ids of the devices to notify
        #[arg(short, long = "device", required = true)]
        devices: Vec<String>,

        /// Send one bulk request instead of one request per device
        #[arg(long)]
        bulk: bool,

        /// Alert text, the canned test message when omitted
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_env("RUST_LOG"))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from_path(path)?,
        None => Settings::load()?,
    };

    // Instruments bind to the provider installed when they are created
    let meter_provider = telemetry::exporter::init_meter_provider(&settings.telemetry)?;
    telemetry::metrics_registry::init_metrics_registry();

    let context = AppContext::from_settings(&settings).await?;
    let result = run(cli.command, settings, context).await;

    if let Some(provider) = meter_provider {
        telemetry::exporter::shutdown_meter_provider(provider);
    }

    result
}

async fn run(command: Command, settings: Settings, context: AppContext) -> Result<()> {
    match command {
        Command::Serve => {
            let webserver_task_handle = spawn(async move {
                debug!("starting webserver");
                if let Err(e) = webserver::start(&settings.webserver, context).await {
                    error!("Error occurred while running webserver: {:?}", e);
                }
            });

            tokio::select! {
                _ = webserver_task_handle => {
                    debug!("Webserver task completed")
                }
            }
        }
        Command::Send {
            gateway,
            devices,
            bulk,
            message,
        } => {
            let report = match message {
                Some(message) => {
                    context
                        .device_service
                        .notify(
                            gateway,
                            &devices,
                            &Notification::alert(message),
                            &SendOptions::default(),
                            bulk,
                        )
                        .await?
                }
                None => {
                    context
                        .device_service
                        .send_test_message(gateway, &devices, bulk)
                        .await?
                }
            };

            for line in &report.summary {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
