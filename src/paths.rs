use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

/// Prefix for every run directory name.
pub const RUN_DIR_PREFIX: &str = "bwbackup_";
/// Timestamp format: ISO 8601 to the second with `:` swapped for `.`.
pub const RUN_DIR_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H.%M.%S";

/// Canonical path layout for one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    run_dir: PathBuf,
}

impl BackupPaths {
    /// Creates a layout for a run started at `started_at` under `output_root`.
    pub fn for_run<Tz>(output_root: impl AsRef<Path>, started_at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let name = format!(
            "{RUN_DIR_PREFIX}{}",
            started_at.format(RUN_DIR_TIMESTAMP_FORMAT)
        );
        Self {
            run_dir: output_root.as_ref().join(name),
        }
    }

    /// Run directory.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Full vault export.
    pub fn export_file(&self) -> PathBuf {
        self.run_dir.join("export.json")
    }

    /// `list folders` output.
    pub fn folders_file(&self) -> PathBuf {
        self.run_dir.join("folders.json")
    }

    /// `list items` output.
    pub fn items_file(&self) -> PathBuf {
        self.run_dir.join("items.json")
    }

    /// One-line-per-attachment manifest.
    pub fn attachments_manifest_file(&self) -> PathBuf {
        self.run_dir.join("attachments.txt")
    }

    /// Attachment download directory.
    pub fn attachments_dir(&self) -> PathBuf {
        self.run_dir.join("attachments")
    }

    /// Download directory for one item's attachments.
    pub fn item_attachments_dir(&self, item_component: &str) -> PathBuf {
        self.attachments_dir().join(item_component)
    }

    /// `list organizations` output.
    pub fn organizations_file(&self) -> PathBuf {
        self.run_dir.join("organizations.json")
    }

    /// Per-organization export directory.
    pub fn organizations_dir(&self) -> PathBuf {
        self.run_dir.join("organizations")
    }

    /// Credential record for operator reference.
    pub fn credential_record_file(&self) -> PathBuf {
        self.run_dir.join("master_password.txt")
    }
}
