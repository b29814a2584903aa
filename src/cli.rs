//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::AuthSetting;

/// Download remote resources through an authenticated-access retry loop.
///
/// Files are staged next to their destination and only appear under their
/// final name once they are complete.
#[derive(Parser, Debug)]
#[command(name = "authdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: $XDG_CONFIG_HOME/authdl/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a resource into a file and print its final path
    Download {
        /// URL to download
        url: String,

        /// Destination file or existing directory
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Replace the destination if it already exists
        #[arg(long)]
        overwrite: bool,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Fetch a resource and write its content to stdout
    Fetch {
        /// URL to fetch
        url: String,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Check that a resource exists and print its metadata
    Check {
        /// URL to check
        url: String,

        /// Print metadata as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        auth: AuthArgs,
    },
}

impl Command {
    /// Authentication flags of the selected command.
    #[must_use]
    pub fn auth(&self) -> &AuthArgs {
        match self {
            Self::Download { auth, .. } | Self::Fetch { auth, .. } | Self::Check { auth, .. } => {
                auth
            }
        }
    }
}

/// Authentication flags shared by every command.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Authentication scheme of the source
    #[arg(long, value_enum)]
    pub auth: Option<AuthSetting>,

    /// User name for basic authentication
    #[arg(long)]
    pub username: Option<String>,

    /// Regex recognising an authentication failure page (repeatable)
    #[arg(long = "failure-pattern", value_name = "REGEX")]
    pub failure_patterns: Vec<String>,

    /// Never prompt; fail instead of asking for credentials
    #[arg(long)]
    pub no_input: bool,
}
