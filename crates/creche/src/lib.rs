//! `creche` - Child registration and attendance core for daycare clients
//!
//! This library derives a deterministic identity key for each child, creates
//! child profiles without ever producing duplicates (even under concurrent
//! registrations), and records daily attendance against those profiles.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod actor;
pub mod attendance;
pub mod child;
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod registry;
pub mod store;

pub use actor::{Actor, Role};
pub use attendance::{AttendanceLog, AttendanceRecord, AttendanceStatus};
pub use child::{ChildRecord, ChildUpdate, NewChild};
pub use config::Config;
pub use error::{Error, Result};
pub use identity::{derive_child_key, normalize_name};
pub use logging::init_logging;
pub use registry::ChildRegistry;
pub use store::{DocumentStore, MemoryStore, SqliteStore};
