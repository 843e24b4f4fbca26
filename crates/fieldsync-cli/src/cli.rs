use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldsync_core::models::{PersonKind, SyncStatus};

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Capture campaign registrations offline and sync them when the network allows")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to JSON configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a participant or facilitator
    #[command(alias = "new")]
    Add(AddArgs),
    /// List registrations, newest first
    List {
        /// Number of registrations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show registrations with this sync status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one registration
    Show {
        /// Registration UUID or unique UUID prefix
        id: String,
    },
    /// Change fields of a registration
    Edit {
        /// Registration UUID or unique UUID prefix
        id: String,
        /// Field assignment, e.g. --set place=Maun --set age=31
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        assignments: Vec<String>,
    },
    /// Record attendance for a campaign day
    Attend {
        /// Registration UUID or unique UUID prefix
        id: String,
        /// Campaign day (1-12)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=12))]
        day: u8,
        /// Mark the day as missed instead
        #[arg(long)]
        absent: bool,
    },
    /// Push pending registrations and pull remote changes
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show sync state and record counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the background until interrupted
    Watch,
    /// Campaign attendance and demographics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export registrations as JSON
    Export {
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Local database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
pub struct AddArgs {
    /// First name
    #[arg(long)]
    pub first_name: String,
    /// Last name
    #[arg(long)]
    pub last_name: String,
    /// Gender (M or F)
    #[arg(long)]
    pub gender: String,
    /// Age in years
    #[arg(long)]
    pub age: u32,
    /// Registration type
    #[arg(long = "type", value_enum, default_value_t = KindArg::Participant)]
    pub kind: KindArg,
    /// Phone number or other contact
    #[arg(long)]
    pub contact: Option<String>,
    /// Village or town
    #[arg(long)]
    pub place: Option<String>,
    /// Highest education level
    #[arg(long)]
    pub education: Option<String>,
    /// Marital status
    #[arg(long)]
    pub marital_status: Option<String>,
    /// UUID of the facilitator running the session
    #[arg(long, value_name = "UUID")]
    pub facilitator: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Participant,
    Facilitator,
}

impl From<KindArg> for PersonKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Participant => Self::Participant,
            KindArg::Facilitator => Self::Facilitator,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusFilter {
    Pending,
    Synced,
    Failed,
    NeedsReview,
}

impl From<StatusFilter> for SyncStatus {
    fn from(value: StatusFilter) -> Self {
        match value {
            StatusFilter::Pending => Self::Pending,
            StatusFilter::Synced => Self::Synced,
            StatusFilter::Failed => Self::Failed,
            StatusFilter::NeedsReview => Self::NeedsReview,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

impl From<CompletionShell> for clap_complete::Shell {
    fn from(value: CompletionShell) -> Self {
        match value {
            CompletionShell::Bash => Self::Bash,
            CompletionShell::Zsh => Self::Zsh,
            CompletionShell::Fish => Self::Fish,
            CompletionShell::PowerShell => Self::PowerShell,
        }
    }
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue registrations the remote rejected for another push
    Requeue,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Move an unreadable local database aside and start with an empty one
    Reset {
        /// Move the database aside even when it opens cleanly
        #[arg(long)]
        force: bool,
    },
}
