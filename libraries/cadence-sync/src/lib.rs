//! Cadence Sync
//!
//! Last-write-wins synchronisation of the local store with the backend.
//!
//! A cycle pulls every table since its cursor, resolves conflicts by
//! `updated_at` (ties go to the backend), pushes dirty rows and pending
//! removals, then advances the cursor of each table that finished cleanly.
//! Cursors follow the backend's `synced_at` stamp, never a device clock, so
//! an edit pushed late by an offline device is still pulled everywhere.
//! Only one cycle runs at a time; a trigger that arrives meanwhile is
//! coalesced.

mod engine;
mod error;
mod resolver;
mod scheduler;
mod state;
mod types;

// Public exports
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use resolver::{resolve, Resolution};
pub use scheduler::SyncHandle;
pub use types::{
    CycleOutcome, CycleReport, SyncConfig, SyncStatus, SyncTrigger, TableReport,
    DEFAULT_INTERVAL,
};
