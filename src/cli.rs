use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "meetbot-probe",
    version,
    about = "Drive and inspect a meeting-bot HTTP server"
)]
pub struct Cli {
    /// Base URL of the bot server [default: http://localhost:3002]
    #[arg(long, global = true, env = "MEETBOT_BASE_URL")]
    pub base_url: Option<String>,

    /// Wire naming convention: meeting-url, url or session
    #[arg(long, global = true, env = "MEETBOT_SCHEMA")]
    pub schema: Option<String>,

    /// Per-request timeout in seconds [default: 30]
    #[arg(long, global = true, env = "MEETBOT_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Bearer token for servers that require authentication
    #[arg(long, global = true, env = "MEETBOT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Config file [default: ~/.config/meetbot-probe/config.toml]
    #[arg(long, global = true, env = "MEETBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also print the raw response body
    #[arg(long, global = true)]
    pub raw: bool,

    /// Log request details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Check whether the bot server is up and ready
    Health,
    /// Ask the bot to join a meeting
    Join {
        /// Meeting URL to join
        #[arg(long)]
        meeting_url: Option<String>,
        /// Display name the bot joins with
        #[arg(long)]
        name: Option<String>,
        /// Keep checking status until the bot is idle
        #[arg(long)]
        poll: bool,
        /// Seconds between status checks [default: 5]
        #[arg(long, requires = "poll")]
        poll_interval: Option<u64>,
        /// Maximum number of status checks [default: 12]
        #[arg(long, requires = "poll")]
        poll_attempts: Option<u32>,
        /// Ask the bot to leave again once joined (after polling, if any)
        #[arg(long)]
        leave_after: bool,
    },
    /// List active bots, or show one session's state
    Status {
        /// Session to inspect, for servers with per-session status
        #[arg(long)]
        bot_id: Option<String>,
    },
    /// Ask a bot to leave its meeting
    Leave {
        /// Bot id returned by `join`
        #[arg(long)]
        bot_id: Option<String>,
    },
    /// Show the tail of the server log
    Logs {
        /// Number of lines to show
        #[arg(long, default_value_t = 200)]
        lines: usize,
    },
}
