//! `SQLite` database handle for the `AniPilot` relay.

anipilot_core::define_database!(RelayDatabase, "Relay database migrations complete");
