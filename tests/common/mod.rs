#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use bwbackup::{
    bw::{BwExecutor, BwOutput},
    error::{BackupError, Result},
};
use secrecy::SecretString;

pub const USER_ID: &str = "me@example.com";
pub const MASTER_PASSWORD: &str = "correct horse battery staple";
pub const SESSION_TOKEN: &str = "session-token-123";

pub const FOLDERS_JSON: &str =
    r#"[{"object":"folder","id":"fld-1","name":"Work"},{"object":"folder","id":null,"name":"No Folder"}]"#;
pub const ITEMS_JSON: &str = r#"[
  {"id":"item-1","name":"Bank","organizationId":null,
   "attachments":[{"id":"att-1","fileName":"statement.pdf","size":"10"}]},
  {"id":"item-2","name":"Shared wifi","organizationId":"org-a"},
  {"id":"item-3","name":"Plain login"}
]"#;
pub const ORGANIZATIONS_JSON: &str =
    r#"[{"object":"organization","id":"org-a","name":"Acme Corp"},{"id":"org-b","name":"Side Project"}]"#;

/// One recorded executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub args: Vec<String>,
    pub environment: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn line(&self) -> String {
        self.args.join(" ")
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Scripted stand-in for the vault tool that records every call.
///
/// `export` and `get attachment` write a small file at their `--output`
/// path, as the real tool does.
pub struct FakeBw {
    pub folders: String,
    pub items: String,
    pub organizations: String,
    pub login_status: i32,
    pub login_stdout: String,
    pub fail_on: Option<String>,
    pub panic_on: Option<String>,
    pub logout_unavailable: bool,
    calls: Mutex<Vec<RecordedCall>>,
    parent_env_leaks: Mutex<Vec<String>>,
}

impl Default for FakeBw {
    fn default() -> Self {
        Self {
            folders: FOLDERS_JSON.to_owned(),
            items: ITEMS_JSON.to_owned(),
            organizations: ORGANIZATIONS_JSON.to_owned(),
            login_status: 0,
            login_stdout: format!("{SESSION_TOKEN}\n"),
            fail_on: None,
            panic_on: None,
            logout_unavailable: false,
            calls: Mutex::new(Vec::new()),
            parent_env_leaks: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBw {
    pub fn with_items(mut self, items: &str) -> Self {
        self.items = items.to_owned();
        self
    }

    pub fn with_organizations(mut self, organizations: &str) -> Self {
        self.organizations = organizations.to_owned();
        self
    }

    pub fn failing_on(mut self, command_prefix: &str) -> Self {
        self.fail_on = Some(command_prefix.to_owned());
        self
    }

    pub fn panicking_on(mut self, command_prefix: &str) -> Self {
        self.panic_on = Some(command_prefix.to_owned());
        self
    }

    pub fn with_login(mut self, status: i32, stdout: &str) -> Self {
        self.login_status = status;
        self.login_stdout = stdout.to_owned();
        self
    }

    pub fn with_logout_unavailable(mut self) -> Self {
        self.logout_unavailable = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::line).collect()
    }

    /// Environment keys from child calls that were also visible in this process.
    pub fn parent_env_leaks(&self) -> Vec<String> {
        self.parent_env_leaks.lock().unwrap().clone()
    }

    fn ok(stdout: impl Into<String>) -> BwOutput {
        BwOutput {
            status_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

impl BwExecutor for FakeBw {
    fn exec(&self, args: &[&str], environment: &[(&str, &str)]) -> Result<BwOutput> {
        let call = RecordedCall {
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            environment: environment
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
        };
        for (key, _) in environment {
            if std::env::var_os(key).is_some() {
                self.parent_env_leaks.lock().unwrap().push((*key).to_owned());
            }
        }
        let line = call.line();
        self.calls.lock().unwrap().push(call);

        if let Some(prefix) = &self.panic_on {
            if line.starts_with(prefix.as_str()) {
                panic!("simulated crash: {line}");
            }
        }
        if let Some(prefix) = &self.fail_on {
            if line.starts_with(prefix.as_str()) {
                return Ok(BwOutput {
                    status_code: 1,
                    stdout: String::new(),
                    stderr: format!("simulated failure: {line}"),
                });
            }
        }

        match args {
            ["logout", ..] if self.logout_unavailable => {
                Err(BackupError::MissingBinary("bw".to_owned()))
            }
            ["logout", ..] => Ok(Self::ok("")),
            ["login", ..] => Ok(BwOutput {
                status_code: self.login_status,
                stdout: self.login_stdout.clone(),
                stderr: if self.login_status == 0 {
                    String::new()
                } else {
                    "Username or password is incorrect. Try again.".to_owned()
                },
            }),
            ["sync", ..] => Ok(Self::ok("Syncing complete.")),
            ["list", "folders"] => Ok(Self::ok(self.folders.clone())),
            ["list", "items"] => Ok(Self::ok(self.items.clone())),
            ["list", "organizations"] => Ok(Self::ok(self.organizations.clone())),
            ["export", ..] | ["get", "attachment", ..] => {
                let output = output_arg(args).ok_or_else(|| {
                    BackupError::InvalidInput(format!("missing --output in `{line}`"))
                })?;
                fs::write(output, format!("written by: {line}"))?;
                Ok(Self::ok(format!("Saved {}", output.display())))
            }
            _ => Ok(BwOutput {
                status_code: 1,
                stdout: String::new(),
                stderr: format!("unknown command: {line}"),
            }),
        }
    }
}

fn output_arg<'a>(args: &[&'a str]) -> Option<&'a Path> {
    args.windows(2)
        .find(|pair| pair[0] == "--output")
        .map(|pair| Path::new(pair[1]))
}

pub fn password() -> SecretString {
    SecretString::new(MASTER_PASSWORD.to_owned())
}

pub fn only_child_dir(root: &Path) -> PathBuf {
    let entries = fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    assert_eq!(entries.len(), 1, "expected one run directory: {entries:?}");
    entries.into_iter().next().unwrap()
}

#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, body).unwrap();
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).unwrap();
}

/// Bash stand-in for the vault tool. Appends each invocation to `$log`.
#[cfg(unix)]
pub fn fake_bw_script(log: &Path) -> String {
    format!(
        r#"#!/usr/bin/env bash
set -euo pipefail
log="{log}"
{{
  printf 'args:%s\n' "$*"
  printf 'session:%s\n' "${{BW_SESSION:-}}"
  printf 'inherited_password:%s\n' "${{BW_PASSWORD:-}}"
}} >> "$log"
output=""
previous=""
for arg in "$@"; do
  if [[ "$previous" == "--output" ]]; then
    output="$arg"
  fi
  previous="$arg"
done
case "$1" in
  logout)
    echo "You are not logged in." >&2
    exit 1
    ;;
  login)
    channel="$3"
    if [[ "${{!channel:-}}" != "{password}" ]]; then
      echo "Username or password is incorrect. Try again." >&2
      exit 1
    fi
    printf '%s\n' "{token}"
    ;;
  sync)
    echo "Syncing complete."
    ;;
  export|get)
    printf '{{"encrypted": false}}' > "$output"
    ;;
  list)
    case "$2" in
      folders) printf '%s' '{folders}' ;;
      items) printf '%s' '{items}' ;;
      organizations) printf '%s' '{organizations}' ;;
    esac
    ;;
  *)
    echo "unknown command: $*" >&2
    exit 2
    ;;
esac
"#,
        log = log.display(),
        password = MASTER_PASSWORD,
        token = SESSION_TOKEN,
        folders = FOLDERS_JSON,
        items = ITEMS_JSON.replace('\n', " "),
        organizations = ORGANIZATIONS_JSON,
    )
}
