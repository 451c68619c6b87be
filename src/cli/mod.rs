pub mod ops;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stakepilot")]
#[command(about = "Automated staking across a batch of accounts", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Truncate the process log
    ClearLog,
    /// Reset the account state file to an empty mapping
    ResetData,
    /// Follow the process log (like tail -f)
    WatchLog,
    /// Verify the configuration and scaffold any missing files
    CheckConfig,
    /// Print a summary table of all tracked accounts
    Accounts,
}
