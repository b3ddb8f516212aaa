//! `AniPilot` Relay Library
//!
//! Core functionality for the `AniPilot` sync relay:
//! - `SQLite` storage for users, sync state, command queue, and notification log
//! - Agent credentials, pairing codes, and control-plane session proofs
//! - Heartbeat merging and the polled command queue
//! - Marathon queue editing
//! - Opportunistic liveness sweep
//! - Chat notifications with per-type cooldown
//! - HTTP endpoints for agents and the control plane

pub mod auth;
pub mod liveness;
pub mod marathon;
pub mod notifications;
pub mod server;
pub mod storage;
pub mod sync;
