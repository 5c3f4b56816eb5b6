mod cli;
mod server;

use clap::{Parser, Subcommand};
use routekeeper_core::logging::init_logging;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "routekeeper",
    version,
    about = "Routekeeper: route admission and status controller for a load balancer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the router
    Run {
        /// Path to the routekeeper config file
        #[arg(long, default_value = "config/routekeeper.hcl")]
        config: PathBuf,

        /// JSON-lines watch events, `-` for stdin
        #[arg(long, default_value = "-")]
        events: String,
    },

    /// Validate configuration and exit
    Check {
        #[arg(long, default_value = "config/routekeeper.hcl")]
        config: PathBuf,

        /// Disable colored output
        #[arg(long)]
        plain: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { config, plain } => {
            if !cli::check::check(&config, plain) {
                std::process::exit(1);
            }
        }

        Command::Run { config, events } => {
            init_logging();

            if let Err(e) = server::run(&config, &events) {
                eprintln!("routekeeper error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
