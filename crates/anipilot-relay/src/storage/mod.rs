//! `SQLite` storage for the `AniPilot` relay.
//!
//! Persists users, per-user sync state, the polled command queue, and the
//! notification cooldown ledger. Every time-dependent query takes `now`
//! from the caller's clock.

mod db;
mod models;
mod queries_commands;
mod queries_notifications;
mod queries_state;
mod queries_users;


pub use anipilot_core::db::DatabaseError;
pub use db::RelayDatabase;
pub use models::*;
