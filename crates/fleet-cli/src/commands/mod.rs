pub mod plan;
pub mod prune;
pub mod scale;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::ValueEnum;
use tracing::warn;

use fleet_control::{CancelSignal, ControlPlaneClient, GoogleCloudClient};
use fleet_core::report::format_report;
use fleet_core::{ExecutionReport, ExecutionSettings, FleetConfig, FleetRegistry, Targets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// A loaded and validated fleet definition.
pub struct Fleet {
    pub registry: Arc<FleetRegistry>,
    pub settings: ExecutionSettings,
}

impl Fleet {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = FleetConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        Self::from_config(&config).with_context(|| format!("invalid fleet in {}", path.display()))
    }

    pub fn from_config(config: &FleetConfig) -> anyhow::Result<Self> {
        Ok(Self {
            registry: Arc::new(FleetRegistry::from_config(config)?),
            settings: config.execution_settings()?,
        })
    }
}

pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleet=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

pub fn google_client(
    access_token: Option<String>,
    settings: &ExecutionSettings,
) -> anyhow::Result<Arc<dyn ControlPlaneClient>> {
    let token = access_token
        .filter(|t| !t.trim().is_empty())
        .context("no access token: pass --access-token or set FLEET_ACCESS_TOKEN")?;
    Ok(Arc::new(GoogleCloudClient::new(token, settings)?))
}

/// Cancel the run on the first Ctrl-C. In-flight calls still complete.
pub fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = CancelSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight operations");
            handle.cancel();
        }
    });
    signal
}

pub fn targets(services: Vec<String>) -> Targets {
    Targets::from_names(Some(services))
}

pub fn render_report(report: &ExecutionReport, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Text => format_report(report),
    })
}

pub fn print_report(report: &ExecutionReport, format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", render_report(report, format)?);
    Ok(())
}

/// Non-zero when any operation failed; skipped entries alone are fine.
pub fn exit_code(report: &ExecutionReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
