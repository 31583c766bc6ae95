use std::{
    collections::HashSet,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, TimeZone};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::{
    bw::{BwClient, BwExecutor, ListKind, PasswordChannel, SessionGuard, SessionToken},
    error::{BackupError, Result},
    fs_secure::{
        ensure_private_dir, reset_private_dir, safe_file_component, set_permissions,
        write_private_file_atomic, PRIVATE_FILE_MODE,
    },
    paths::BackupPaths,
    records::{
        distinct_organization_ids, manifest_line, parse_folders, parse_items,
        parse_organizations, Item,
    },
    types::Credential,
};

/// One step of the export sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    /// Pull vault state from the server.
    Sync,
    /// Full vault JSON export.
    Export,
    /// Folder listing.
    Folders,
    /// Item listing.
    Items,
    /// Attachment downloads.
    Attachments,
    /// Organization listing and per-organization exports.
    Organizations,
}

impl ExportStage {
    /// Every stage in execution order.
    pub const ALL: [ExportStage; 6] = [
        ExportStage::Sync,
        ExportStage::Export,
        ExportStage::Folders,
        ExportStage::Items,
        ExportStage::Attachments,
        ExportStage::Organizations,
    ];

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Sync => "sync",
            ExportStage::Export => "export",
            ExportStage::Folders => "folders",
            ExportStage::Items => "items",
            ExportStage::Attachments => "attachments",
            ExportStage::Organizations => "organizations",
        }
    }
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts and location of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Timestamped run directory.
    pub run_dir: PathBuf,
    /// Folders listed.
    pub folders: usize,
    /// Items listed.
    pub items: usize,
    /// Attachments downloaded.
    pub attachments: usize,
    /// Organizations exported.
    pub organizations: usize,
}

/// Drives one full backup per call.
pub struct BackupOrchestrator<E: BwExecutor> {
    client: BwClient<E>,
}

impl<E: BwExecutor> BackupOrchestrator<E> {
    /// Creates an orchestrator over `executor`.
    pub fn new(executor: E) -> Self {
        Self {
            client: BwClient::new(executor),
        }
    }

    /// Typed client used for every call.
    pub fn client(&self) -> &BwClient<E> {
        &self.client
    }

    /// Runs a backup into a fresh directory under `output_root`.
    pub fn run(&self, output_root: &Path, credential: Credential) -> Result<BackupReport> {
        self.run_at(output_root, credential, &Local::now())
    }

    /// Runs a backup whose directory is named from `started_at`.
    pub fn run_at<Tz>(
        &self,
        output_root: &Path,
        credential: Credential,
        started_at: &DateTime<Tz>,
    ) -> Result<BackupReport>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        self.client.logout_quietly();

        let paths = BackupPaths::for_run(output_root, started_at);
        info!("Backing up to {}.", paths.run_dir().display());
        prepare_layout(&paths)?;

        let mut session = SessionGuard::open(&self.client);
        let outcome = match self.authenticate(&mut session, &paths, credential) {
            Ok(()) => session
                .begin_export()
                .and_then(|token| self.export_all(token, &paths)),
            Err(failure) => Err(failure),
        };
        session.close();
        outcome
    }

    fn authenticate(
        &self,
        session: &mut SessionGuard<'_, E>,
        paths: &BackupPaths,
        credential: Credential,
    ) -> Result<()> {
        let (user_id, master_password) = credential.into_parts();
        write_credential_record(&paths.credential_record_file(), &user_id, &master_password)?;

        let channel = PasswordChannel::open(master_password);
        let login = session.login(&user_id, &channel);
        drop(channel);
        login?;

        info!("You are logged in!");
        Ok(())
    }

    fn export_all(&self, token: &SessionToken, paths: &BackupPaths) -> Result<BackupReport> {
        run_stage(ExportStage::Sync, || self.client.sync(token))?;
        run_stage(ExportStage::Export, || {
            let export_file = paths.export_file();
            self.client.export_vault(token, &export_file)?;
            restrict_written_file(&export_file)
        })?;

        let folders = run_stage(ExportStage::Folders, || {
            let folders_file = paths.folders_file();
            let raw = self.capture_list(token, ListKind::Folders, &folders_file)?;
            parse_folders(&artifact_name(&folders_file), &raw)
        })?;
        info!(
            "Backed up {} folders to {}.",
            folders.len(),
            paths.folders_file().display()
        );

        let items = run_stage(ExportStage::Items, || {
            let items_file = paths.items_file();
            let raw = self.capture_list(token, ListKind::Items, &items_file)?;
            parse_items(&artifact_name(&items_file), &raw)
        })?;
        info!("Backed up {} items.", items.len());

        let attachments = run_stage(ExportStage::Attachments, || {
            self.export_attachments(token, paths, &items)
        })?;
        let organizations = run_stage(ExportStage::Organizations, || {
            self.export_organizations(token, paths, &items)
        })?;

        Ok(BackupReport {
            run_dir: paths.run_dir().to_path_buf(),
            folders: folders.len(),
            items: items.len(),
            attachments,
            organizations,
        })
    }

    fn capture_list(&self, token: &SessionToken, kind: ListKind, target: &Path) -> Result<String> {
        let raw = self.client.list(token, kind)?;
        write_private_file_atomic(target, raw.as_bytes())?;
        Ok(raw)
    }

    // Best-effort: downloads need a premium account and are unverified
    // against the live service.
    fn export_attachments(
        &self,
        token: &SessionToken,
        paths: &BackupPaths,
        items: &[Item],
    ) -> Result<usize> {
        let manifest_path = paths.attachments_manifest_file();
        let mut manifest = File::create(&manifest_path)?;
        set_permissions(&manifest_path, PRIVATE_FILE_MODE)?;

        let mut total = 0;
        for item in items {
            let Some(attachments) = item.attachments.as_deref() else {
                continue;
            };
            let item_dir = paths.item_attachments_dir(&safe_file_component(&item.id));
            let mut used_names = HashSet::new();
            for attachment in attachments {
                writeln!(manifest, "{}", manifest_line(item, attachment))?;

                let file_name =
                    unique_file_name(&mut used_names, &attachment.id, &attachment.file_name);
                ensure_private_dir(&item_dir)?;
                let target = item_dir.join(file_name);
                self.client
                    .get_attachment(token, &attachment.id, &item.id, &target)?;
                restrict_written_file(&target)?;
            }
            info!(
                "Backed up {} attachments for item {}.",
                attachments.len(),
                item.id
            );
            total += attachments.len();
        }
        manifest.flush()?;

        info!(
            "Backed up {total} attachments to {}.",
            paths.attachments_dir().display()
        );
        Ok(total)
    }

    fn export_organizations(
        &self,
        token: &SessionToken,
        paths: &BackupPaths,
        items: &[Item],
    ) -> Result<usize> {
        let organizations_file = paths.organizations_file();
        let raw = self.capture_list(token, ListKind::Organizations, &organizations_file)?;
        let directory = parse_organizations(&artifact_name(&organizations_file), &raw)?;
        debug!("Listed {} organizations.", directory.len());

        let organization_ids = distinct_organization_ids(items);
        for organization_id in &organization_ids {
            let organization = directory
                .get(organization_id)
                .ok_or_else(|| BackupError::UnknownOrganization((*organization_id).to_owned()))?;
            let file_name = safe_file_component(&format!(
                "{}_{}.json",
                organization.id, organization.name
            ));
            let target = paths.organizations_dir().join(file_name);
            self.client
                .export_organization(token, organization_id, &target)?;
            restrict_written_file(&target)?;
        }

        info!(
            "Backed up {} organizations to {}.",
            organization_ids.len(),
            paths.organizations_dir().display()
        );
        Ok(organization_ids.len())
    }
}

fn run_stage<T>(stage: ExportStage, operation: impl FnOnce() -> Result<T>) -> Result<T> {
    operation().map_err(|failure| failure.in_stage(stage))
}

fn prepare_layout(paths: &BackupPaths) -> Result<()> {
    reset_private_dir(paths.run_dir())?;
    ensure_private_dir(&paths.attachments_dir())?;
    ensure_private_dir(&paths.organizations_dir())?;
    Ok(())
}

fn unique_file_name(used_names: &mut HashSet<String>, attachment_id: &str, raw: &str) -> String {
    let base_name = safe_file_component(raw);
    let mut file_name = base_name.clone();
    let mut attempt = 0_usize;
    while !used_names.insert(file_name.clone()) {
        attempt += 1;
        file_name = if attempt == 1 {
            safe_file_component(&format!("{attachment_id}_{base_name}"))
        } else {
            safe_file_component(&format!("{attachment_id}_{attempt}_{base_name}"))
        };
    }
    file_name
}

fn write_credential_record(path: &Path, user_id: &str, password: &SecretString) -> Result<()> {
    let record = Zeroizing::new(format!(
        "user: {user_id}\npassword: {}\n",
        password.expose_secret()
    ));
    write_private_file_atomic(path, record.as_bytes())
}

fn restrict_written_file(path: &Path) -> Result<()> {
    if path.is_file() {
        set_permissions(path, PRIVATE_FILE_MODE)?;
    }
    Ok(())
}

fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod unit_tests {
    use std::collections::HashSet;

    use super::{run_stage, unique_file_name, ExportStage};
    use crate::error::BackupError;

    #[test]
    fn colliding_attachment_names_get_distinct_files() {
        let mut used_names = HashSet::new();
        let names = [
            unique_file_name(&mut used_names, "a1", "a2_report.pdf"),
            unique_file_name(&mut used_names, "a2", "report.pdf"),
            unique_file_name(&mut used_names, "a2", "report.pdf"),
            unique_file_name(&mut used_names, "a2", "report.pdf"),
        ];
        assert_eq!(
            names,
            ["a2_report.pdf", "report.pdf", "a2_2_report.pdf", "a2_3_report.pdf"]
        );
    }

    #[test]
    fn stages_run_in_documented_order() {
        let names = ExportStage::ALL
            .iter()
            .map(|stage| stage.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["sync", "export", "folders", "items", "attachments", "organizations"]
        );
    }

    #[test]
    fn run_stage_tags_failures_with_stage() {
        let result: Result<(), BackupError> = run_stage(ExportStage::Items, || {
            Err(BackupError::InvalidInput("boom".to_owned()))
        });
        assert!(matches!(
            result,
            Err(BackupError::Stage {
                stage: ExportStage::Items,
                ..
            })
        ));
    }
}
