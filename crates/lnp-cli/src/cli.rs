use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lnpgw",
    about = "LNP gateway core: TN ranges, correlation keys and subscription-version state",
    version
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create (or open and migrate) a store database
    Init {
        /// Path to the SQLite store
        #[arg(long, default_value = crate::support::DEFAULT_DB_PATH)]
        db: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Expand TNs and ranges into individual TNs
    Expand {
        /// `NNN-NNN-NNNN` or `NNN-NNN-NNNN-NNNN`
        #[arg(required = true)]
        ranges: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Collapse TNs into minimal contiguous ranges
    Collapse {
        /// TNs in any order
        #[arg(required = true)]
        tns: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply inbound requests and notifications from a JSONL file
    Submit {
        /// JSONL file, one document per line
        input: String,

        /// Path to the SQLite store
        #[arg(long, default_value = crate::support::DEFAULT_DB_PATH)]
        db: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every subscription version, message and snapshot for a TN
    Show {
        tn: String,

        /// Path to the SQLite store
        #[arg(long, default_value = crate::support::DEFAULT_DB_PATH)]
        db: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List queued messages awaiting the registry adapter
    Queue {
        /// Path to the SQLite store
        #[arg(long, default_value = crate::support::DEFAULT_DB_PATH)]
        db: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
