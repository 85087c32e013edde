//! Command-line interface for creche.
//!
//! This module provides the CLI structure for the `creche` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ActorArgs, AttendanceCommand, ChildCommand, ChildIdentityArgs, ConfigCommand,
    RegistryCommand, RoleArg, StatusArg, UpdateArgs,
};

use crate::logging::Verbosity;

/// creche - Register children once, take attendance daily
///
/// Derives a stable identity key per child, refuses duplicate registrations
/// and records daily attendance in a local database.
#[derive(Debug, Parser)]
#[command(name = "creche")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register, look up and edit children
    #[command(subcommand)]
    Child(ChildCommand),

    /// Mark and list attendance
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "creche");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["creche", "config", "path"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["creche", "-vv", "config", "path"]).verbosity(), Verbosity::Trace);
        assert_eq!(parse(&["creche", "-q", "-v", "config", "path"]).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_parse_child_key() {
        let cli = parse(&[
            "creche", "child", "key", "--parent", "P1", "--name", "Jean-Luc", "--dob", "2020-05-15",
        ]);
        let Command::Child(ChildCommand::Key(identity)) = cli.command else {
            panic!("expected child key");
        };
        assert_eq!(identity.parent, "P1");
        assert_eq!(identity.name, "Jean-Luc");
        assert_eq!(identity.dob, "2020-05-15");
    }

    #[test]
    fn test_parse_child_register_with_allergies() {
        let cli = parse(&[
            "creche", "child", "register", "-p", "P1", "-n", "Ana", "-d", "2020-01-01", "-a",
            "milk", "--allergy", "egg",
        ]);
        let Command::Child(ChildCommand::Registry(RegistryCommand::Register {
            allergies,
            json,
            ..
        })) = cli.command
        else {
            panic!("expected child register");
        };
        assert_eq!(allergies, vec!["milk", "egg"]);
        assert!(!json);
    }

    #[test]
    fn test_parse_child_list_and_update_reach_registry_commands() {
        let cli = parse(&["creche", "child", "list", "--parent", "P1", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Child(ChildCommand::Registry(RegistryCommand::List { json: true, .. }))
        ));

        let cli = parse(&[
            "creche", "child", "update", "ID", "--user", "P1", "--role", "parent", "--name", "Ana",
        ]);
        let Command::Child(ChildCommand::Registry(RegistryCommand::Update(args))) = cli.command
        else {
            panic!("expected child update");
        };
        assert_eq!(args.id, "ID");
        assert_eq!(args.to_update().name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_parse_child_update_rejects_conflicting_allergy_flags() {
        let result = Cli::try_parse_from([
            "creche", "child", "update", "ID", "--user", "P1", "--role", "parent", "--allergy",
            "egg", "--clear-allergies",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_attendance_mark() {
        let cli = parse(&[
            "creche", "attendance", "mark", "CHILD", "--date", "2024-09-02", "--status", "late",
            "--user", "S1", "--role", "staff", "--note", "bus",
        ]);
        let Command::Attendance(AttendanceCommand::Mark {
            child_id,
            status,
            actor,
            note,
            ..
        }) = cli.command
        else {
            panic!("expected attendance mark");
        };
        assert_eq!(child_id, "CHILD");
        assert_eq!(status, StatusArg::Late);
        assert_eq!(actor.role, RoleArg::Staff);
        assert_eq!(note.as_deref(), Some("bus"));
    }

    #[test]
    fn test_parse_attendance_list_needs_date_or_child() {
        assert!(Cli::try_parse_from(["creche", "attendance", "list"]).is_err());
        assert!(Cli::try_parse_from([
            "creche", "attendance", "list", "--date", "2024-09-02", "--child", "X"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["creche", "attendance", "list", "--child", "X"]).is_ok());
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["creche", "-c", "/custom/config.toml", "config", "show"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_invalid_role_rejected() {
        let result = Cli::try_parse_from([
            "creche", "attendance", "mark", "C", "--date", "2024-09-02", "--status", "present",
            "--user", "U", "--role", "janitor",
        ]);
        assert!(result.is_err());
    }
}
