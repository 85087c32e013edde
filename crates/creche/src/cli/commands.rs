//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::actor::{Actor, Role};
use crate::attendance::AttendanceStatus;
use crate::child::ChildUpdate;

/// Identity of a child: parent, name and date of birth.
#[derive(Debug, Clone, Args)]
pub struct ChildIdentityArgs {
    /// Registering parent's user id
    #[arg(short, long)]
    pub parent: String,

    /// Child's name as typed
    #[arg(short, long)]
    pub name: String,

    /// Date of birth (YYYY-MM-DD)
    #[arg(short, long)]
    pub dob: String,
}

/// Who is performing a write.
#[derive(Debug, Clone, Args)]
pub struct ActorArgs {
    /// Acting user id
    #[arg(short, long)]
    pub user: String,

    /// Acting user's role
    #[arg(short, long, value_enum)]
    pub role: RoleArg,
}

impl ActorArgs {
    /// Build the actor these flags describe.
    #[must_use]
    pub fn to_actor(&self) -> Actor {
        Actor::new(self.user.clone(), self.role.into())
    }
}

/// Child profile commands.
#[derive(Debug, Subcommand)]
pub enum ChildCommand {
    /// Print the identity key a child would get (no database access)
    Key(ChildIdentityArgs),

    /// Commands that read or write the child registry.
    #[command(flatten)]
    Registry(RegistryCommand),
}

/// Child commands backed by the database.
#[derive(Debug, Subcommand)]
pub enum RegistryCommand {
    /// Register a child unless an identical one exists
    Register {
        #[command(flatten)]
        identity: ChildIdentityArgs,

        /// Known allergy (repeatable)
        #[arg(short, long = "allergy", value_name = "ALLERGY")]
        allergies: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a child is already registered
    Exists(ChildIdentityArgs),

    /// Show one child
    Show {
        /// Child id
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a parent's children
    List {
        /// Parent user id
        #[arg(short, long)]
        parent: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit a child's name or allergies
    Update(UpdateArgs),
}

/// Arguments of `child update`.
#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    /// Child id
    pub id: String,

    /// Who is making the change.
    #[command(flatten)]
    pub actor: ActorArgs,

    /// New display name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Replacement allergy (repeatable)
    #[arg(short, long = "allergy", value_name = "ALLERGY")]
    pub allergies: Vec<String>,

    /// Remove all allergies
    #[arg(long, conflicts_with = "allergies")]
    pub clear_allergies: bool,
}

impl UpdateArgs {
    /// Build the update these flags describe.
    ///
    /// No `--allergy` flags leaves allergies untouched; `--clear-allergies`
    /// empties the list.
    #[must_use]
    pub fn to_update(&self) -> ChildUpdate {
        let allergies = if self.clear_allergies {
            Some(Vec::new())
        } else if self.allergies.is_empty() {
            None
        } else {
            Some(self.allergies.clone())
        };

        ChildUpdate {
            name: self.name.clone(),
            allergies,
        }
    }
}

/// Attendance commands.
#[derive(Debug, Subcommand)]
pub enum AttendanceCommand {
    /// Mark a child's attendance for a day
    Mark {
        /// Child id
        child_id: String,

        /// Day (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Attendance status
        #[arg(short, long, value_enum)]
        status: StatusArg,

        #[command(flatten)]
        actor: ActorArgs,

        /// Note for the day
        #[arg(long)]
        note: Option<String>,
    },

    /// List attendance for a day or a child
    List {
        /// Day (YYYY-MM-DD)
        #[arg(short, long, required_unless_present = "child", conflicts_with = "child")]
        date: Option<String>,

        /// Child id
        #[arg(long)]
        child: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Parent
    Parent,
    /// Daycare staff
    Staff,
    /// Administrator
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Parent => Self::Parent,
            RoleArg::Staff => Self::Staff,
            RoleArg::Admin => Self::Admin,
        }
    }
}

/// Attendance status argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Attended
    Present,
    /// Did not attend
    Absent,
    /// Arrived late
    Late,
    /// Excused absence
    Excused,
}

impl From<StatusArg> for AttendanceStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Present => Self::Present,
            StatusArg::Absent => Self::Absent,
            StatusArg::Late => Self::Late,
            StatusArg::Excused => Self::Excused,
        }
    }
}
