use std::{
    fs, io,
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::error::Result;

/// Default Unix mode for private directories.
pub const PRIVATE_DIR_MODE: u32 = 0o700;
/// Default Unix mode for private files.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

const REPLACEMENT_CHARACTER: char = '_';
const MAX_COMPONENT_BYTES: usize = 200;
const MAX_EXTENSION_BYTES: usize = 16;

/// Ensures a directory exists and applies restricted permissions.
pub fn ensure_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    set_permissions(path, PRIVATE_DIR_MODE)
}

/// Removes `path` if present and recreates it empty with restricted permissions.
pub fn reset_private_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error.into()),
    }
    ensure_private_dir(path)
}

/// Writes a file atomically with restricted permissions.
pub fn write_private_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    create_parent_dir(path)?;

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, bytes)?;
    set_permissions(&temp_path, PRIVATE_FILE_MODE)?;
    fs::rename(&temp_path, path)?;
    set_permissions(path, PRIVATE_FILE_MODE)
}

/// Applies Unix permissions when supported.
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Turns an untrusted name into a single safe path component.
///
/// Separators, control characters and reserved punctuation become `_`, and
/// names made only of dots are rejected by replacement so the result can
/// never climb out of its parent directory. Long names are cut to 200 UTF-8
/// bytes on a character boundary, keeping a short extension.
pub fn safe_file_component(raw: &str) -> String {
    let component = raw
        .trim()
        .chars()
        .map(|character| {
            if character.is_control() || "/\\:*?\"<>|".contains(character) {
                REPLACEMENT_CHARACTER
            } else {
                character
            }
        })
        .collect::<String>();

    let component = truncate_component(&component);
    if component.is_empty() || component.chars().all(|character| character == '.') {
        return REPLACEMENT_CHARACTER.to_string();
    }
    component
}

fn truncate_component(component: &str) -> String {
    if component.len() <= MAX_COMPONENT_BYTES {
        return component.to_owned();
    }
    let extension = component
        .rfind('.')
        .filter(|&dot| dot > 0 && component.len() - dot <= MAX_EXTENSION_BYTES)
        .map_or("", |dot| &component[dot..]);
    let stem = &component[..component.len() - extension.len()];
    let mut end = MAX_COMPONENT_BYTES - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{extension}", &stem[..end])
}

fn temp_path_for(path: &Path) -> PathBuf {
    let suffix = Uuid::new_v4();
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tmp");
    let temp_name = format!(".{file_name}.{suffix}.tmp");
    path.with_file_name(temp_name)
}

fn create_parent_dir(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    Ok(())
}
