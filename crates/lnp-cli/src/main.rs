//! LNP gateway CLI: the `lnpgw` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "LNPGW_LOG";

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = support::load_config_or_exit(cli.config.as_deref());

    match cli.command {
        Commands::Init { db, json } => commands::init::run(db, &config, json),
        Commands::Expand { ranges, json } => commands::expand::run(ranges, json),
        Commands::Collapse { tns, json } => commands::collapse::run(tns, json),
        Commands::Submit { input, db, json } => commands::submit::run(input, db, &config, json),
        Commands::Show { tn, db, json } => commands::show::run(tn, db, &config, json),
        Commands::Queue { db, json } => commands::queue::run(db, &config, json),
    }
}

/// `LNPGW_LOG` wins over `-v`. Logs go to stderr so JSON stdout stays clean.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
