//! `AniPilot` Core Library
//!
//! Shared functionality for `AniPilot` components:
//! - Injectable clock for deterministic timing
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Timing configuration for the sync subsystem
//! - Tracing initialisation
//! - Common error types

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TimingConfig;
pub use error::{Error, Result};
