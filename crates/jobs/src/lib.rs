//! Vodum Jobs
//!
//! Plex, Tautulli and SMTP clients, and every scheduled job of the panel:
//! synchronization, status derivation, access revocation, unfriending,
//! reminders, mail campaigns, health checks, backups and cleanup.

pub mod backup;
pub mod config;
pub mod error;
pub mod libraries;
pub mod mail_queue;
pub mod mailer;
pub mod plex;
pub mod reminders;
pub mod revocation;
pub mod runner;
pub mod servers;
pub mod status;
pub mod sync;
pub mod tautulli;
pub mod temp_cleanup;
pub mod unfriend;

pub use config::JobsConfig;
pub use error::{JobError, JobResult};
pub use mailer::{MailError, MailTransport, OutgoingMail, SmtpMailer};
pub use plex::{PlexClient, PlexError};
pub use runner::{run_task, JobContext};
pub use status::{compute_subscription_status, days_remaining, StatusInputs};
pub use tautulli::{TautulliClient, TautulliSession};
