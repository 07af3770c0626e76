//! # Booking Server
//!
//! Wiring for the `booking-server` binary: environment configuration and
//! the default notification transport. The binary itself connects to
//! `PostgreSQL`, starts the ledger and notifier drains and serves the HTTP
//! API until Ctrl+C.

pub mod config;
pub mod notifications;

pub use config::{Config, ConfigError};
pub use notifications::LogNotificationSender;
