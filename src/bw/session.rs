use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BackupError, Result};

use super::{client::BwClient, executor::BwExecutor};

/// Prefix of the one-shot password channel variable name.
pub const PASSWORD_CHANNEL_PREFIX: &str = "BW_PASSWORD_";

/// Session token returned by `bw login --raw`.
pub struct SessionToken {
    inner: SecretString,
}

impl SessionToken {
    /// Wraps a raw token, trimming surrounding whitespace.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            inner: SecretString::new(trimmed.to_owned()),
        })
    }

    pub(crate) fn expose(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Randomly named, single-use environment channel for the master password.
///
/// The variable only ever exists in the environment of the `bw login` child
/// process. The value is zeroized when the channel is dropped.
pub struct PasswordChannel {
    name: String,
    value: SecretString,
}

impl PasswordChannel {
    /// Opens a channel with a fresh random name.
    pub fn open(password: SecretString) -> Self {
        let suffix = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self {
            name: format!("{PASSWORD_CHANNEL_PREFIX}{suffix}"),
            value: password,
        }
    }

    /// Environment variable name for this channel.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn expose_value(&self) -> &str {
        self.value.expose_secret()
    }
}

impl std::fmt::Debug for PasswordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordChannel")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; initial and terminal state.
    LoggedOut,
    /// Login call in flight.
    LoggingIn,
    /// Login succeeded and a token is held.
    LoggedIn,
    /// Export sequence running with the held token.
    Exporting,
    /// Login call failed; logout still pending.
    LoginFailed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::LoggedOut => "logged out",
            SessionState::LoggingIn => "logging in",
            SessionState::LoggedIn => "logged in",
            SessionState::Exporting => "exporting",
            SessionState::LoginFailed => "login failed",
        };
        f.write_str(label)
    }
}

/// Scoped vault session.
///
/// Closing the guard logs out (tolerating failure) and clears the token.
/// [`SessionGuard::close`] is idempotent and also runs on drop, so logout
/// happens on every exit path including unwinding.
pub struct SessionGuard<'c, E: BwExecutor> {
    client: &'c BwClient<E>,
    token: Option<SessionToken>,
    state: SessionState,
    closed: bool,
}

impl<'c, E: BwExecutor> SessionGuard<'c, E> {
    /// Opens a guard in the logged-out state.
    pub fn open(client: &'c BwClient<E>) -> Self {
        Self {
            client,
            token: None,
            state: SessionState::LoggedOut,
            closed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while a session token is held.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Logs in through `channel` and stores the returned token.
    pub fn login(&mut self, user_id: &str, channel: &PasswordChannel) -> Result<()> {
        if self.closed || self.state != SessionState::LoggedOut {
            return Err(BackupError::InvalidInput(format!(
                "cannot log in while {}",
                self.state
            )));
        }

        self.transition(SessionState::LoggingIn);
        match self.client.login(user_id, channel) {
            Ok(token) => {
                self.token = Some(token);
                self.transition(SessionState::LoggedIn);
                Ok(())
            }
            Err(error) => {
                self.transition(SessionState::LoginFailed);
                Err(error)
            }
        }
    }

    /// Moves into the export state and returns the session token.
    pub fn begin_export(&mut self) -> Result<&SessionToken> {
        if self.state != SessionState::LoggedIn {
            return Err(BackupError::InvalidInput(format!(
                "cannot export while {}",
                self.state
            )));
        }
        self.transition(SessionState::Exporting);
        self.token
            .as_ref()
            .ok_or_else(|| BackupError::InvalidInput("no active session".to_owned()))
    }

    /// Logs out and clears the token; returns the terminal state.
    pub fn close(&mut self) -> SessionState {
        if !self.closed {
            self.closed = true;
            self.client.logout_quietly();
            self.token = None;
            self.transition(SessionState::LoggedOut);
        }
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

impl<E: BwExecutor> Drop for SessionGuard<'_, E> {
    fn drop(&mut self) {
        self.close();
    }
}
