use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fleet_core::ScalingPolicy;

mod commands;

use commands::OutputFormat;

#[derive(Parser)]
#[command(
    name = "fleetctl",
    about = "Fleet lifecycle manager — warm, idle and prune a service fleet",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Fleet definition.
    #[arg(short, long, global = true, default_value = "fleet.toml")]
    config: PathBuf,

    /// OAuth2 access token for the control plane
    /// (e.g. `gcloud auth print-access-token`).
    #[arg(long, global = true, env = "FLEET_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Report format.
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a scaling policy (warm or idle) to the fleet.
    ///
    /// warm keeps at least one instance per service and starts the
    /// database; idle allows scale-to-zero and stops the database.
    Scale {
        policy: ScalingPolicy,
        /// Services to scale (comma-separated). Default: all.
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,
        /// After warming, wait for each service's ready_url to answer.
        #[arg(long)]
        wait_ready: bool,
    },
    /// Delete retired revisions, keeping the newest N per service.
    Prune {
        #[arg(short, long, default_value_t = 2)]
        keep: usize,
        /// Services to prune (comma-separated). Default: all.
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,
    },
    /// Show what `scale` would do, without calling the control plane.
    Plan {
        policy: ScalingPolicy,
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    commands::init_tracing(cli.log_json);

    let fleet = commands::Fleet::load(&cli.config)?;

    let report = match cli.command {
        Commands::Plan { policy, services } => {
            println!("{}", commands::plan::render(&fleet, policy, services, cli.format)?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Scale {
            policy,
            services,
            wait_ready,
        } => {
            let client = commands::google_client(cli.access_token, &fleet.settings)?;
            let cancel = commands::cancel_on_ctrl_c();
            commands::scale::run(&fleet, client, policy, services, wait_ready, cancel).await?
        }
        Commands::Prune { keep, services } => {
            let client = commands::google_client(cli.access_token, &fleet.settings)?;
            let cancel = commands::cancel_on_ctrl_c();
            commands::prune::run(&fleet, client, keep, services, cancel).await?
        }
    };

    commands::print_report(&report, cli.format)?;
    Ok(commands::exit_code(&report))
}
