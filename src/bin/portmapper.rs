//! portmapper - open or close a NAT port mapping on the local gateway
//!
//! Discovers NAT-PMP and UPnP gateways, runs one open or close and exits.
//! A UPnP mapping opened with an explicit lifetime is closed by this process
//! once the lifetime has passed, so the process stays alive until then.
//! Without one the UPnP mapping stays until it is closed.

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use portmapper::cli::{self, Command, EXIT_USAGE};
use portmapper::config::MappingDefaults;
use portmapper::gateway::Orchestrator;
use tracing::info;

/// Open or close a NAT port mapping via NAT-PMP or UPnP
#[derive(Parser)]
#[command(name = "portmapper", version, disable_help_subcommand = true)]
struct Args {
    /// command internalPort externalPort [protocol] [lifetime]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn exit_with_usage(defaults: &MappingDefaults, reason: &str) -> ! {
    println!("{}\n", reason);
    print!("{}", cli::usage("portmapper", defaults, ""));
    std::process::exit(EXIT_USAGE);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portmapper::init();
    let defaults = MappingDefaults::default();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => exit_with_usage(&defaults, &e.to_string()),
    };

    let parsed = match cli::parse_args(&args.args, &defaults) {
        Ok(parsed) => parsed,
        Err(e) => exit_with_usage(&defaults, &e.to_string()),
    };

    let orchestrator = Orchestrator::discover()
        .await
        .context("could not get a gateway")?;

    let mut result = match parsed.command {
        Command::Open => orchestrator.open_mapping(&parsed.request).await,
        Command::Close => orchestrator.close_mapping(&parsed.request).await,
    };
    // A defaulted lifetime leaves the UPnP mapping in place once we exit
    result.expires_in_secs = cli::expiry_wait(&parsed, &result);
    println!("{}", cli::render(&result));

    if let Some(secs) = result.expires_in_secs {
        info!("Keeping the UPnP mapping open for {}s", secs);
        orchestrator.wait_for_expiries().await;
    }

    std::process::exit(cli::exit_code(&result));
}
