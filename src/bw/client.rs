use std::path::Path;

use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::error::{BackupError, Result};

use super::{
    executor::{BwExecutor, BwOutput, SESSION_ENV_VAR},
    session::{PasswordChannel, SessionToken},
};

/// Collections listable with `bw list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `bw list folders`.
    Folders,
    /// `bw list items`.
    Items,
    /// `bw list organizations`.
    Organizations,
}

impl ListKind {
    fn as_arg(self) -> &'static str {
        match self {
            ListKind::Folders => "folders",
            ListKind::Items => "items",
            ListKind::Organizations => "organizations",
        }
    }
}

/// Typed wrapper over the vault tool's command-line contract.
pub struct BwClient<E: BwExecutor> {
    executor: E,
}

impl<E: BwExecutor> BwClient<E> {
    /// Creates a client over `executor`.
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Underlying executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs `bw logout`, ignoring any failure. Returns true on a clean logout.
    pub fn logout_quietly(&self) -> bool {
        match self.invoke(&["logout"], &[]) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                debug!(
                    status_code = output.status_code,
                    stderr = %output.stderr.trim(),
                    "logout reported failure (ignored)"
                );
                false
            }
            Err(error) => {
                warn!("logout could not run (ignored): {error}");
                false
            }
        }
    }

    /// Runs `bw login --passwordenv <channel> --raw <user id>`.
    pub fn login(&self, user_id: &str, channel: &PasswordChannel) -> Result<SessionToken> {
        let mut output = self.invoke(
            &["login", "--passwordenv", channel.name(), "--raw", user_id],
            &[(channel.name(), channel.expose_value())],
        )?;

        let token = output
            .success()
            .then(|| SessionToken::new(&output.stdout))
            .flatten();
        match token {
            Some(token) => {
                output.stdout.zeroize();
                Ok(token)
            }
            None => Err(BackupError::LoginFailed {
                stdout: if output.success() {
                    "no session token returned".to_owned()
                } else {
                    output.stdout
                },
                stderr: output.stderr,
            }),
        }
    }

    /// Runs `bw sync`.
    pub fn sync(&self, session: &SessionToken) -> Result<()> {
        self.run_with_session(&["sync"], session).map(|_| ())
    }

    /// Runs `bw export --format json --output <path>`.
    pub fn export_vault(&self, session: &SessionToken, output: &Path) -> Result<()> {
        let output = path_arg(output)?;
        self.run_with_session(&["export", "--format", "json", "--output", output], session)
            .map(|_| ())
    }

    /// Runs `bw list <kind>` and returns its standard output.
    pub fn list(&self, session: &SessionToken, kind: ListKind) -> Result<String> {
        self.run_with_session(&["list", kind.as_arg()], session)
            .map(|output| output.stdout)
    }

    /// Runs `bw get attachment <id> --item_id <item> --output <path>`.
    pub fn get_attachment(
        &self,
        session: &SessionToken,
        attachment_id: &str,
        item_id: &str,
        output: &Path,
    ) -> Result<()> {
        let output = path_arg(output)?;
        self.run_with_session(
            &[
                "get",
                "attachment",
                attachment_id,
                "--item_id",
                item_id,
                "--output",
                output,
            ],
            session,
        )
        .map(|_| ())
    }

    /// Runs `bw export --organization_id <id> --format json --output <path>`.
    pub fn export_organization(
        &self,
        session: &SessionToken,
        organization_id: &str,
        output: &Path,
    ) -> Result<()> {
        let output = path_arg(output)?;
        self.run_with_session(
            &[
                "export",
                "--organization_id",
                organization_id,
                "--format",
                "json",
                "--output",
                output,
            ],
            session,
        )
        .map(|_| ())
    }

    fn run_with_session(&self, args: &[&str], session: &SessionToken) -> Result<BwOutput> {
        let output = self.invoke(args, &[(SESSION_ENV_VAR, session.expose())])?;
        if output.success() {
            return Ok(output);
        }
        Err(BackupError::CommandFailed {
            command: display_command(args),
            status_code: output.status_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn invoke(&self, args: &[&str], environment: &[(&str, &str)]) -> Result<BwOutput> {
        info!("{}", display_command(args));
        self.executor.exec(args, environment)
    }
}

fn display_command(args: &[&str]) -> String {
    let mut rendered = String::from("bw");
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        BackupError::InvalidInput(format!(
            "output path is not valid UTF-8: {}",
            path.display()
        ))
    })
}
