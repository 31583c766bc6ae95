#![deny(missing_docs)]
//! bwbackup drives the Bitwarden CLI to take a complete local backup of a
//! vault: full export, listings, attachments, and organization exports.

/// Backup orchestration.
pub mod backup;
/// Vault tool plumbing.
pub mod bw;
/// Command-line interface.
pub mod cli;
/// Config file parsing and selection.
pub mod config;
/// Error types.
pub mod error;
/// Secure filesystem helpers.
pub mod fs_secure;
/// Run directory layout.
pub mod paths;
/// Typed vault listing records.
pub mod records;
/// Shared types.
pub mod types;
