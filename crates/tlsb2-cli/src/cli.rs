use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tlsb2",
    about = "Inspect and maintain TLS certificates stored in a B2 bucket",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Storage configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Object prefix, overriding the configuration file
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// List the bucket instead of using the metadata index
    #[arg(long, global = true)]
    pub no_index: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect or delete site certificates
    Site(SiteArgs),
    /// Inspect ACME accounts
    User(UserArgs),
    /// List stored sites and accounts
    List,
    /// Rebuild the metadata index from a bucket listing
    Reindex,
    /// Delete every object under the prefix
    Truncate(TruncateArgs),
}

#[derive(Args)]
pub struct SiteArgs {
    #[command(subcommand)]
    pub action: SiteAction,
}

#[derive(Subcommand)]
pub enum SiteAction {
    /// Check whether a certificate is stored
    Exists { domain: String },
    /// Show a stored certificate bundle
    Show { domain: String },
    /// Delete a stored certificate bundle
    Delete { domain: String },
}

#[derive(Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Show a stored ACME account
    Show { email: String },
    /// Print the most recently stored account email
    Latest,
}

#[derive(Args)]
pub struct TruncateArgs {
    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}
