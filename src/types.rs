use secrecy::{ExposeSecret, SecretString};

use crate::error::{BackupError, Result};

/// Account login supplied once per run.
///
/// The master password lives in a [`SecretString`] and is zeroized when the
/// credential is dropped. [`crate::backup::BackupOrchestrator::run`] takes
/// the credential by value and drops it as soon as authentication ends.
pub struct Credential {
    user_id: String,
    master_password: SecretString,
}

impl Credential {
    /// Creates a validated credential.
    pub fn new(user_id: impl Into<String>, master_password: SecretString) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(BackupError::InvalidInput(
                "user id cannot be empty".to_owned(),
            ));
        }
        if user_id.chars().any(char::is_control) {
            return Err(BackupError::InvalidInput(
                "user id cannot contain control characters".to_owned(),
            ));
        }
        if master_password.expose_secret().is_empty() {
            return Err(BackupError::InvalidInput(
                "master password cannot be empty".to_owned(),
            ));
        }
        Ok(Self {
            user_id,
            master_password,
        })
    }

    pub(crate) fn into_parts(self) -> (String, SecretString) {
        (self.user_id, self.master_password)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("master_password", &"[REDACTED]")
            .finish()
    }
}
