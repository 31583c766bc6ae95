use std::{
    fs,
    path::{Component, Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

const CONFIG_VERSION_V1: u32 = 1;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = ".bwbackup.toml";
/// Environment variable that selects a config file.
pub const CONFIG_ENV_VAR: &str = "BWBACKUP_CONFIG";

/// Source used to select the effective config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigSource {
    /// Selected via `--config` CLI flag.
    Flag,
    /// Selected via `BWBACKUP_CONFIG` environment variable.
    Env,
    /// Selected by walking from the current working directory to root.
    Discovered,
    /// No config file selected.
    None,
}

/// Resolved config selection before parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSelection {
    /// Source used for selection.
    pub source: ConfigSource,
    /// Selected path when a config file was found.
    pub path: Option<PathBuf>,
}

/// Raw TOML shape for one `.bwbackup.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackupConfigFile {
    /// Schema version.
    pub version: u32,
    /// Vault tool settings.
    #[serde(default)]
    pub bw: BwConfigFile,
    /// Run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfigFile,
}

/// Raw `[bw]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BwConfigFile {
    /// Vault tool binary name or path.
    pub binary: Option<String>,
}

/// Raw `[defaults]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfigFile {
    /// Default vault account.
    pub user_id: Option<String>,
    /// Default backup root.
    pub output_dir: Option<String>,
}

/// Effective config after validation and path resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupConfig {
    /// Absolute config file path.
    pub source_path: PathBuf,
    /// Vault tool binary override.
    pub bw_binary: Option<String>,
    /// Default vault account.
    pub user_id: Option<String>,
    /// Default backup root, absolute.
    pub output_dir: Option<PathBuf>,
}

impl BackupConfig {
    /// Loads and validates a config file from disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let absolute_path = absolutize_path(path.as_ref(), &cwd);
        if !absolute_path.exists() {
            return Err(BackupError::InvalidInput(format!(
                "config file does not exist: {}",
                absolute_path.display()
            )));
        }

        validate_config_file_permissions(&absolute_path)?;
        let raw = fs::read_to_string(&absolute_path)?;
        Self::parse_from_str(&raw, &absolute_path)
    }

    /// Parses and validates config from TOML text.
    pub fn parse_from_str(raw: &str, source_path: impl AsRef<Path>) -> Result<Self> {
        let parsed = toml::from_str::<BackupConfigFile>(raw)
            .map_err(|error| BackupError::InvalidInput(format!("invalid config TOML: {error}")))?;
        build_config(parsed, source_path.as_ref())
    }
}

/// Selects the config file: flag, then environment, then discovery.
pub fn resolve_config_path(
    explicit_path: Option<&Path>,
    env_path: Option<&str>,
    no_config: bool,
    cwd: impl AsRef<Path>,
) -> Result<ConfigSelection> {
    if no_config {
        return Ok(ConfigSelection {
            source: ConfigSource::None,
            path: None,
        });
    }

    let cwd = cwd.as_ref();
    if let Some(path) = explicit_path {
        return Ok(ConfigSelection {
            source: ConfigSource::Flag,
            path: Some(require_regular_file(absolutize_path(path, cwd))?),
        });
    }

    if let Some(value) = env_path {
        if value.trim().is_empty() {
            return Err(BackupError::InvalidInput(format!(
                "{CONFIG_ENV_VAR} cannot be empty"
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Env,
            path: Some(require_regular_file(absolutize_path(Path::new(value), cwd))?),
        });
    }

    if let Some(discovered) = discover_config(cwd) {
        return Ok(ConfigSelection {
            source: ConfigSource::Discovered,
            path: Some(discovered),
        });
    }

    Ok(ConfigSelection {
        source: ConfigSource::None,
        path: None,
    })
}

/// Walks from `start_dir` to the filesystem root looking for a config file.
pub fn discover_config(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if is_regular_config_candidate(&candidate) {
            return Some(candidate);
        }

        let parent = current.parent()?;
        current = parent;
    }
}

fn build_config(raw: BackupConfigFile, source_path: &Path) -> Result<BackupConfig> {
    if raw.version != CONFIG_VERSION_V1 {
        return Err(BackupError::InvalidInput(format!(
            "unsupported config version {} (expected {})",
            raw.version, CONFIG_VERSION_V1
        )));
    }

    let source_dir = source_path.parent().unwrap_or_else(|| Path::new("."));
    let bw_binary = raw
        .bw
        .binary
        .map(|binary| {
            validate_literal(&binary, "bw.binary")?;
            Ok::<_, BackupError>(binary)
        })
        .transpose()?;
    let user_id = raw
        .defaults
        .user_id
        .map(|user_id| {
            validate_literal(&user_id, "defaults.user_id")?;
            Ok::<_, BackupError>(user_id)
        })
        .transpose()?;
    let output_dir = raw
        .defaults
        .output_dir
        .map(|value| resolve_path_value(&value, source_dir))
        .transpose()?;

    Ok(BackupConfig {
        source_path: source_path.to_path_buf(),
        bw_binary,
        user_id,
        output_dir,
    })
}

fn resolve_path_value(value: &str, source_dir: &Path) -> Result<PathBuf> {
    validate_literal(value, "defaults.output_dir")?;

    let expanded = expand_home(value)?;
    if expanded.is_absolute() {
        return Ok(normalize_path(&expanded));
    }
    Ok(normalize_path(&source_dir.join(expanded)))
}

fn validate_literal(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BackupError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn expand_home(value: &str) -> Result<PathBuf> {
    if value == "~" {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| BackupError::InvalidInput("HOME is not set".to_owned()))?;
        return Ok(PathBuf::from(home));
    }

    if let Some(rest) = value.strip_prefix("~/") {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| BackupError::InvalidInput("HOME is not set".to_owned()))?;
        return Ok(PathBuf::from(home).join(rest));
    }

    if value.starts_with('~') {
        return Err(BackupError::InvalidInput(
            "only '~' and '~/' home expansion are supported".to_owned(),
        ));
    }

    Ok(PathBuf::from(value))
}

fn normalize_path(path: &Path) -> PathBuf {
    let is_absolute = path.is_absolute();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !is_absolute {
                    normalized.push("..");
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        if is_absolute {
            PathBuf::from(std::path::MAIN_SEPARATOR.to_string())
        } else {
            PathBuf::from(".")
        }
    } else {
        normalized
    }
}

/// Resolves `path` against `cwd` and removes `.`/`..` components.
pub fn absolutize_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&cwd.join(path))
    }
}

fn require_regular_file(candidate: PathBuf) -> Result<PathBuf> {
    if !is_regular_config_candidate(&candidate) {
        return Err(BackupError::InvalidInput(format!(
            "config file must be a regular file: {}",
            candidate.display()
        )));
    }
    Ok(candidate)
}

fn validate_config_file_permissions(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() || !metadata.file_type().is_file() {
        return Err(BackupError::InvalidInput(format!(
            "config path must be a regular file: {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o022 != 0 {
            return Err(BackupError::InvalidInput(format!(
                "config file must not be group/world writable: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

fn is_regular_config_candidate(path: &Path) -> bool {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return false;
    };
    !metadata.file_type().is_symlink() && metadata.file_type().is_file()
}
