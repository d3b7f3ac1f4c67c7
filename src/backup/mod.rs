//! Timestamped snapshots of the repair collection with bounded retention.

pub mod handlers;
mod manager;

pub use manager::{BackupError, BackupInfo, BackupManager, Snapshot};
