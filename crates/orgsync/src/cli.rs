//! Clap derive structures for the `orgsync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use orgsync_core::{EntityKind, StaffRole};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// orgsync -- office records from the command line, kept live
#[derive(Debug, Parser)]
#[command(
    name = "orgsync",
    version,
    about = "Manage office organizations and staff from the command line",
    long_about = "Reads and edits organizations and staff through the office REST API.\n\n\
        `watch` keeps a live view that follows server push events and\n\
        changes made by other orgsync processes on this machine.",
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
    /// Server profile to use
    #[arg(long, short = 'p', env = "ORGSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// REST API root (overrides profile), e.g. http://localhost:3000/api
    #[arg(long, short = 'u', env = "ORGSYNC_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Socket.IO server origin (defaults to the API origin)
    #[arg(long, env = "ORGSYNC_SOCKET_URL", global = true)]
    pub socket_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ORGSYNC_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "ORGSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "ORGSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
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
    /// Manage organizations
    #[command(alias = "org", alias = "o")]
    Orgs(OrgsArgs),

    /// Manage staff members
    #[command(alias = "s")]
    Staff(StaffArgs),

    /// Follow live snapshots, connection state, and change notices
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Show record counts, roles, and the newest staff members
    #[command(alias = "dash")]
    Dashboard(DashboardArgs),

    /// Round-trip a ping over the push channel
    Ping(PingArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Organizations ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct OrgsArgs {
    #[command(subcommand)]
    pub command: OrgsCommand,
}

#[derive(Debug, Subcommand)]
pub enum OrgsCommand {
    /// List all organizations
    #[command(alias = "ls")]
    List,

    /// Show one organization
    Get {
        /// Organization ID
        id: String,
    },

    /// Create an organization
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// Update fields of an organization
    Update {
        /// Organization ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// Delete an organization
    #[command(alias = "rm")]
    Delete {
        /// Organization ID
        id: String,
    },

    /// Export organizations as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// List organization names for pickers (id + name)
    Options,
}

// ── Staff ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StaffArgs {
    #[command(subcommand)]
    pub command: StaffCommand,
}

#[derive(Debug, Subcommand)]
pub enum StaffCommand {
    /// List staff members
    #[command(alias = "ls")]
    List {
        /// Only members of this organization (asks the server to filter)
        #[arg(long)]
        organization: Option<String>,
        /// Only members with this role (combines with --organization)
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Show one staff member
    Get {
        /// Staff ID
        id: String,
    },

    /// Create a staff member
    Create {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        /// Organization ID
        #[arg(long)]
        organization: String,
        #[arg(long, value_enum)]
        role: RoleArg,
    },

    /// Update fields of a staff member
    Update {
        /// Staff ID
        id: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Organization ID
        #[arg(long)]
        organization: Option<String>,
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Delete a staff member
    #[command(alias = "rm")]
    Delete {
        /// Staff ID
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Manager,
    Admin,
    Developer,
}

impl From<RoleArg> for StaffRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Manager => Self::Manager,
            RoleArg::Admin => Self::Admin,
            RoleArg::Developer => Self::Developer,
        }
    }
}

// ── Live views ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only follow this record type
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Organization,
    Staff,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Organization => Self::Organization,
            KindArg::Staff => Self::Staff,
        }
    }
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    /// Open the push channel first so the connection flag is live
    #[arg(long)]
    pub connect: bool,
}

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Seconds to wait for the connection and for the pong
    #[arg(long, default_value = "5")]
    pub wait: u64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the current resolved configuration
    Show,

    /// Write a starter config file
    Init {
        /// API root for the default profile
        #[arg(long)]
        api_url: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List configured profiles
    Profiles,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
