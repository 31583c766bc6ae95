use std::{env::VarError, path::PathBuf};

use tracing::{debug, info};

use crate::{
    backup::{BackupOrchestrator, BackupReport},
    bw::executor::{SystemBwExecutor, DEFAULT_BW_BINARY, PASSWORD_ENV_VAR},
    config::{absolutize_path, resolve_config_path, BackupConfig, CONFIG_ENV_VAR},
    error::{classify_error_code, BackupError, Result},
    types::Credential,
};

use super::{
    output::{self, OutputStatus},
    secret_input, Cli,
};

/// Values resolved from CLI arguments, environment, and config.
#[derive(Debug)]
struct EffectiveCliState {
    output_root: PathBuf,
    user_id: String,
    bw_binary: String,
}

pub(crate) fn run(cli: Cli) -> Result<i32> {
    match execute(cli) {
        Ok(report) => {
            let line = format!(
                "Backup complete: {} ({} folders, {} items, {} attachments, {} organizations)",
                report.run_dir.display(),
                report.folders,
                report.items,
                report.attachments,
                report.organizations
            );
            match output::stdout_line(&line) {
                Ok(OutputStatus::Written | OutputStatus::BrokenPipe) => Ok(0),
                Err(error) => Err(BackupError::Io(error)),
            }
        }
        Err(failure) => {
            let line = format!("error[{}]: {failure}", classify_error_code(&failure));
            match output::stderr_line(&line) {
                Ok(OutputStatus::Written | OutputStatus::BrokenPipe) => Ok(1),
                Err(error) => Err(BackupError::Io(error)),
            }
        }
    }
}

fn execute(mut cli: Cli) -> Result<BackupReport> {
    let password = secret_input::resolve_master_password(cli.bw_password.take());
    std::env::remove_var(PASSWORD_ENV_VAR);
    let password = password?;

    let state = load_effective_state(&cli)?;
    let credential = Credential::new(state.user_id, password)?;

    info!("Using vault tool `{}`.", state.bw_binary);
    let orchestrator = BackupOrchestrator::new(SystemBwExecutor::with_binary(state.bw_binary));
    orchestrator.run(&state.output_root, credential)
}

fn load_effective_state(cli: &Cli) -> Result<EffectiveCliState> {
    let current_dir = std::env::current_dir()?;
    let env_path = read_config_env_var()?;
    let selection = resolve_config_path(
        cli.config.as_deref(),
        env_path.as_deref(),
        cli.no_config,
        &current_dir,
    )?;
    debug!(source = ?selection.source, path = ?selection.path, "config selection");
    let loaded_config = match selection.path {
        Some(path) => Some(BackupConfig::load_from_path(path)?),
        None => None,
    };

    let output_root = cli
        .output_dir
        .as_deref()
        .map(|path| absolutize_path(path, &current_dir))
        .or_else(|| {
            loaded_config
                .as_ref()
                .and_then(|config| config.output_dir.clone())
        })
        .ok_or_else(|| {
            BackupError::InvalidInput(
                "OUTPUT_DIR is required (argument or `defaults.output_dir` in config)".to_owned(),
            )
        })?;
    let user_id = cli
        .user_id
        .clone()
        .or_else(|| {
            loaded_config
                .as_ref()
                .and_then(|config| config.user_id.clone())
        })
        .ok_or_else(|| {
            BackupError::InvalidInput(
                "USER_ID is required (argument, BW_USERID, or `defaults.user_id` in config)"
                    .to_owned(),
            )
        })?;
    let bw_binary = cli
        .bw_binary
        .clone()
        .or_else(|| {
            loaded_config
                .as_ref()
                .and_then(|config| config.bw_binary.clone())
        })
        .unwrap_or_else(|| DEFAULT_BW_BINARY.to_owned());

    Ok(EffectiveCliState {
        output_root,
        user_id,
        bw_binary,
    })
}

fn read_config_env_var() -> Result<Option<String>> {
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(BackupError::InvalidInput(format!(
            "{CONFIG_ENV_VAR} must be valid UTF-8"
        ))),
    }
}
