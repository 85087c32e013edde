//! `creche` - CLI for the creche registration core
//!
//! This binary registers children, checks for duplicates and records daily
//! attendance against a local database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use creche::attendance::AttendanceRecord;
use creche::cli::{
    AttendanceCommand, ChildCommand, ChildIdentityArgs, Cli, Command, ConfigCommand,
    RegistryCommand,
};
use creche::{
    derive_child_key, init_logging, AttendanceLog, ChildRecord, ChildRegistry, Config, NewChild,
    SqliteStore,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match cli.command {
        Command::Child(ChildCommand::Key(identity)) => {
            print_key(&identity);
            Ok(())
        }
        Command::Child(ChildCommand::Registry(registry_cmd)) => {
            handle_registry(cli.config, registry_cmd)
        }
        Command::Attendance(attendance_cmd) => handle_attendance(cli.config, attendance_cmd),
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    Config::load_from(config_path).context("failed to load configuration")
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_path();
    SqliteStore::open(&path, config.busy_timeout())
        .with_context(|| format!("failed to open database at {}", path.display()))
}

/// Pure derivation; needs neither config nor database.
fn print_key(identity: &ChildIdentityArgs) {
    println!(
        "{}",
        derive_child_key(&identity.parent, &identity.name, &identity.dob)
    );
}

fn handle_registry(config_path: Option<PathBuf>, cmd: RegistryCommand) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let registry = ChildRegistry::with_rules(&store, config.registration.clone());

    match cmd {
        RegistryCommand::Register {
            identity,
            allergies,
            json,
        } => {
            let input = NewChild::new(identity.parent, identity.name, identity.dob)
                .with_allergies(allergies);
            let record = registry.register(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Registered {}", record.id);
            }
        }
        RegistryCommand::Exists(identity) => {
            let exists = registry.exists_child(&identity.parent, &identity.name, &identity.dob);
            println!("{exists}");
        }
        RegistryCommand::Show { id, json } => {
            let Some(record) = registry.get_child(&id)? else {
                bail!("child not found: {id}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_child(&record);
            }
        }
        RegistryCommand::List { parent, json } => {
            let children = registry.children_for_parent(&parent)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&children)?);
            } else if children.is_empty() {
                println!("No children registered for {parent}");
            } else {
                for child in &children {
                    println!("{}  {}  {}", child.id, child.name, child.date_of_birth);
                }
            }
        }
        RegistryCommand::Update(args) => {
            let record =
                registry.update_child(&args.actor.to_actor(), &args.id, &args.to_update())?;
            println!("Updated {}", record.id);
        }
    }
    Ok(())
}

fn print_child(record: &ChildRecord) {
    println!("Child {}", record.id);
    println!("  Parent:        {}", record.parent_id);
    println!("  Name:          {}", record.name);
    println!("  Date of birth: {}", record.date_of_birth);
    if record.allergies.is_empty() {
        println!("  Allergies:     none");
    } else {
        println!("  Allergies:     {}", record.allergies.join(", "));
    }
    println!("  Created:       {}", record.created_at.to_rfc3339());
    println!("  Updated:       {}", record.updated_at.to_rfc3339());
}

fn handle_attendance(config_path: Option<PathBuf>, cmd: AttendanceCommand) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let log = AttendanceLog::new(&store);

    match cmd {
        AttendanceCommand::Mark {
            child_id,
            date,
            status,
            actor,
            note,
        } => {
            let record = log.mark(
                &actor.to_actor(),
                &child_id,
                &date,
                status.into(),
                note.as_deref(),
            )?;
            println!("Marked {} {} on {}", record.child_id, record.status, record.date);
        }
        AttendanceCommand::List { date, child, json } => {
            let records = match (date, child) {
                (Some(date), _) => log.for_date(&date)?,
                (None, Some(child)) => log.for_child(&child)?,
                (None, None) => bail!("either --date or --child is required"),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_attendance(&records);
            }
        }
    }
    Ok(())
}

fn print_attendance(records: &[AttendanceRecord]) {
    if records.is_empty() {
        println!("No attendance recorded");
        return;
    }
    for record in records {
        match &record.note {
            Some(note) => println!(
                "{}  {}  {:<8} {} ({})",
                record.date, record.child_id, record.status, record.marked_by, note
            ),
            None => println!(
                "{}  {}  {:<8} {}",
                record.date, record.child_id, record.status, record.marked_by
            ),
        }
    }
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = load_config(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:        {}", config.database_path().display());
                println!("  Busy timeout (ms):    {}", config.storage.busy_timeout_ms);
                println!();
                println!("[Registration]");
                println!(
                    "  Max name length:      {}",
                    config.registration.max_name_length
                );
                println!("  Max allergies:        {}", config.registration.max_allergies);
                println!(
                    "  Future birth dates:   {}",
                    config.registration.allow_future_birth_dates
                );
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                config_path
                    .unwrap_or_else(Config::default_config_path)
                    .display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
