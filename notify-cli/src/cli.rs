use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use notify_client::InboxTab;

#[derive(Parser, Debug)]
#[command(name = "notify")]
#[command(about = "Realtime notification client: listen, browse the inbox, answer friend requests")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "NOTIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// SQLite database URL (overrides the config file)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Signed-in user id
    #[arg(short, long, global = true, env = "NOTIFY_USER_ID")]
    pub user_id: Option<String>,

    /// Bearer token of the signed-in user
    #[arg(short, long, global = true, env = "NOTIFY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the push subscription and print notifications as they arrive
    Listen {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Show one page of the locally cached inbox
    Inbox {
        /// Tab to show: friend-requests, likes or comments
        #[arg(default_value = "friend-requests")]
        tab: InboxTab,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Accept or reject a pending friend request
    Respond {
        /// Friend request id
        request_id: i64,

        /// Reject instead of accept
        #[arg(long)]
        reject: bool,
    },

    /// Manage configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,

        /// Write the default configuration to the config file
        #[arg(long, conflicts_with = "show")]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON document per notification or page
    Json,
}
