//! carpc-cli - Command-line client for carpc role servers
//!
//! Sends a single call to a role server and prints the reply, or lists the
//! operation catalog.

mod commands;

use carpc_client::{ConnectionConfig, TcpClientEndpoint};
use carpc_protocol::{ClientEndpoint, Role};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "carpc-cli")]
#[command(about = "Command-line client for carpc role servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, env = "CARPC_SERVER", default_value = "127.0.0.1:7411")]
    server: SocketAddr,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one call and print the reply
    Call {
        /// Operation name as sent on the wire (e.g. GetRegistration)
        operation: String,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// List the operation catalog
    Operations {
        /// Only list operations served by this role (ra, va, ca, sa)
        #[arg(short, long)]
        role: Option<Role>,
    },
}

/// Where the request payload comes from. Omit all three for an empty payload.
#[derive(Args, Default)]
#[group(multiple = false)]
struct PayloadArgs {
    /// JSON payload, validated and sent compact
    #[arg(long)]
    json: Option<String>,

    /// Payload sent as the literal UTF-8 bytes of this string
    #[arg(long)]
    raw: Option<String>,

    /// Payload read verbatim from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Operations { role } => {
            print!("{}", commands::list_operations(role));
        }
        Commands::Call { operation, payload } => {
            let body = commands::read_payload(
                payload.json.as_deref(),
                payload.raw.as_deref(),
                payload.file.as_deref(),
            )
            .unwrap_or_else(|e| {
                eprintln!("{}: {}", "Invalid payload".red(), e);
                std::process::exit(2);
            });

            if operation.parse::<carpc_protocol::Method>().is_err() {
                tracing::warn!("{} is not in the operation catalog", operation);
            }

            let config = ConnectionConfig::new(cli.server)
                .with_client_name("cli")
                .with_request_timeout(Duration::from_secs(cli.timeout));
            let endpoint = TcpClientEndpoint::connect(config).unwrap_or_else(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                std::process::exit(1);
            });

            let result = endpoint.dispatch_sync(&operation, body);
            // Close before exiting so the runtime shuts down cleanly.
            let _ = endpoint.close();

            match result {
                Ok(reply) => println!("{}", commands::format_reply(&reply)),
                Err(e) => {
                    eprintln!("{}", commands::format_error(&e));
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
