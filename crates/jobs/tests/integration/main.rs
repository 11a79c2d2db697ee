//! Integration tests for the Vodum jobs
//!
//! Every test runs against a fresh in-memory SQLite database with the
//! migrations applied, and a mockito server standing in for Plex.tv and the
//! media servers.
//!
//! ## Running Tests
//! ```bash
//! cargo test -p vodum-jobs --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;
mod libraries;
mod reminders;
mod revocation;
mod runner;
mod servers;
mod status;
mod sync;
mod unfriend;
