use secrecy::SecretString;

use crate::error::{BackupError, Result};

const PASSWORD_PROMPT: &str = "Bitwarden master password: ";

/// Resolves the master password from the flag/env value, else a masked prompt.
pub(crate) fn resolve_master_password(value: Option<String>) -> Result<SecretString> {
    resolve_master_password_with(value, || {
        rpassword::prompt_password(PASSWORD_PROMPT).map_err(BackupError::Io)
    })
}

pub(crate) fn resolve_master_password_with<F>(
    value: Option<String>,
    prompt: F,
) -> Result<SecretString>
where
    F: FnOnce() -> Result<String>,
{
    let password = match value {
        Some(password) => password,
        None => prompt()?,
    };
    if password.is_empty() {
        return Err(BackupError::InvalidInput(
            "master password cannot be empty".to_owned(),
        ));
    }
    Ok(SecretString::new(password))
}

#[cfg(test)]
mod unit_tests {
    use secrecy::ExposeSecret;

    use super::resolve_master_password_with;
    use crate::error::BackupError;

    #[test]
    fn provided_value_skips_prompt() {
        let password = resolve_master_password_with(Some("hunter2".to_owned()), || {
            panic!("prompt must not run")
        })
        .unwrap();
        assert_eq!(password.expose_secret(), "hunter2");
    }

    #[test]
    fn missing_value_uses_prompt() {
        let password = resolve_master_password_with(None, || Ok("typed".to_owned())).unwrap();
        assert_eq!(password.expose_secret(), "typed");
    }

    #[test]
    fn empty_password_is_rejected() {
        let error = resolve_master_password_with(None, || Ok(String::new())).unwrap_err();
        assert!(matches!(error, BackupError::InvalidInput(_)));
    }
}
