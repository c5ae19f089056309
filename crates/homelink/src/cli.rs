//! Clap derive structures for the `homelink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// homelink -- Home Assistant from the command line
#[derive(Debug, Parser)]
#[command(
    name = "homelink",
    version,
    about = "Query and control Home Assistant, or relay it to other clients",
    long_about = "Talks to a Home Assistant instance over its WebSocket and REST APIs.\n\n\
        `homelink serve` runs a relay that republishes the live state stream\n\
        as server-sent events; `homelink watch` consumes such a relay.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "HOMELINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 'u', env = "HOMELINK_URL", global = true)]
    pub url: Option<String>,

    /// Long-lived access token
    #[arg(long, env = "HOMELINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "HOMELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HOMELINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HOMELINK_INSECURE", global = true)]
    pub insecure: bool,

    /// REST request timeout in seconds
    #[arg(long, env = "HOMELINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay: push stream, request proxy and info endpoints
    Serve(ServeArgs),

    /// List entity states
    #[command(alias = "ls")]
    States(StatesArgs),

    /// Show one entity
    Get(GetArgs),

    /// Call a service on an entity
    Call(CallArgs),

    /// Show state history for an entity
    History(HistoryArgs),

    /// Follow live state changes through a relay
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Serve ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address (overrides `bridge.bind`)
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Push-stream keep-alive period, e.g. "15s"
    #[arg(long)]
    pub keepalive: Option<humantime::Duration>,
}

// ── States ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatesArgs {
    /// Only entities in this domain (e.g. "light")
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Only entities whose state equals this value
    #[arg(long)]
    pub state: Option<String>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Entity id, e.g. "light.kitchen"
    pub entity_id: String,
}

// ── Call ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Service as "<domain>.<service>", e.g. "light.turn_on"
    pub service: String,

    /// Target entity id
    pub entity_id: String,

    /// Extra service data as a JSON object
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Extra service data as key=value (value parsed as JSON when possible)
    #[arg(long = "set", short = 's', value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

// ── History ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Entity id
    pub entity_id: String,

    /// How far back to look, e.g. "1h", "2days"
    #[arg(long, default_value = "1h", conflicts_with = "start")]
    pub since: humantime::Duration,

    /// Explicit start (RFC 3339); requires --end
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Explicit end (RFC 3339)
    #[arg(long, requires = "start")]
    pub end: Option<String>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Relay base URL (overrides `bridge.relay_url`)
    #[arg(long, short = 'r', env = "HOMELINK_RELAY")]
    pub relay: Option<String>,

    /// Only report these entities
    #[arg(long = "entity", short = 'e', value_name = "ENTITY_ID")]
    pub entities: Vec<String>,

    /// Poll period while the push stream is unavailable, e.g. "2s"
    #[arg(long)]
    pub poll_interval: Option<humantime::Duration>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile
    Init(ConfigInitArgs),

    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store a profile's access token in the system keyring
    SetToken {
        /// Token to store (read from --token / HOMELINK_TOKEN when omitted)
        token: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct ConfigInitArgs {
    /// Profile name
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Backend base URL, e.g. "http://homeassistant.local:8123"
    #[arg(long)]
    pub base_url: String,

    /// Read the token from this environment variable at run time
    #[arg(long, conflicts_with = "keyring")]
    pub token_env: Option<String>,

    /// Store --token in the system keyring instead of the config file
    #[arg(long)]
    pub keyring: bool,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
