//! Vodum Shared Types and Utilities
//!
//! This crate contains the records, errors and database helpers shared by the
//! Vodum jobs, the admin API and the worker.

pub mod dates;
pub mod db;
pub mod error;
pub mod event_log;
pub mod locks;
pub mod logging;
pub mod settings;
pub mod tasks;
pub mod types;

pub use db::*;
pub use error::*;
pub use settings::{Settings, SmtpSettings};
pub use tasks::{TaskKind, TaskStatusView};
pub use types::*;
