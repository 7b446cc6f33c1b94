use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Verity - bulk configuration driver for a Verity fabric controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a plan of bulk operations from a JSON file
    Apply {
        /// Path to the plan file (see `ApplyPlan` in verity-models)
        plan: PathBuf,

        /// Seconds to wait for each operation to complete
        #[arg(long, default_value = "300")]
        wait_secs: u64,
    },

    /// Fetch and print a resource collection
    Show {
        /// Resource kind (e.g. "tenant", "gateway", "acl")
        kind: String,

        /// IP version for header-split kinds (ACLs)
        #[arg(long)]
        ip_version: Option<String>,
    },

    /// List registered resource kinds and their capabilities
    Kinds,
}
