//! portmapper-client - open or close a port mapping through a portmapper-server

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use portmapper::cli::{self, Command, EXIT_FAILED, EXIT_OK, EXIT_USAGE};
use portmapper::config::{DEFAULT_RPC_PORT, MappingDefaults};
use portmapper::rpc::{ClosePortRequest, OpenPortRequest, RpcClient, Success};

/// Open or close a NAT port mapping via a portmapper-server
#[derive(Parser)]
#[command(name = "portmapper-client", version, disable_help_subcommand = true)]
struct Args {
    /// RPC server ip:port
    #[arg(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_RPC_PORT))]
    server: String,

    /// command internalPort externalPort [protocol] [lifetime]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

const FLAGS_HELP: &str = "
Flags:
  -s, --server <ip:port>  RPC server (default 127.0.0.1:7777)
";

fn exit_with_usage(defaults: &MappingDefaults, reason: &str) -> ! {
    println!("{}\n", reason);
    print!("{}", cli::usage("portmapper-client", defaults, FLAGS_HELP));
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

    println!("Using RPC server {}", args.server);
    let client = RpcClient::new(args.server);

    let response = match parsed.command {
        Command::Open => client
            .open_port(&OpenPortRequest::from_mapping(&parsed.request))
            .await
            .context("opening failed")?,
        Command::Close => client
            .close_port(&ClosePortRequest::from_mapping(&parsed.request))
            .await
            .context("closing failed")?,
    };

    if response.success == Success::Ok {
        println!("Success ({}): {}", response.technology.as_str(), response.message);
        std::process::exit(EXIT_OK);
    }
    println!("Not successful: {}", response.message);
    std::process::exit(EXIT_FAILED);
}
