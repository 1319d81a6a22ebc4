use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pantry Path — rewrite public basket paths into Pantry storage API paths
#[derive(Parser)]
#[command(name = "pantry-path", version, about)]
pub struct Cli {
    /// YAML or JSON config file (PANTRY_* env vars override it)
    #[arg(short, long, global = true, env = "PANTRY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one request through the rewriter and print what would be forwarded
    Rewrite {
        /// Request target, e.g. /my-basket or /prefix/my-basket?x=1
        #[arg(long)]
        path: String,
        /// Pantry ID sent in the key header; omitted means the header is absent
        #[arg(long)]
        key: Option<String>,
    },

    /// Validate the configuration and print the effective values
    Check,
}
