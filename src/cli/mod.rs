mod commands;
mod output;
mod secret_input;

use std::path::PathBuf;

use clap::Parser;

use crate::{
    bw::executor::{PASSWORD_ENV_VAR, USER_ID_ENV_VAR},
    error::Result,
};

const CLI_AFTER_HELP: &str = r#"Examples:
  bwbackup ~/backups me@example.com
  BW_USERID=me@example.com bwbackup ~/backups
  bwbackup --bw-binary /opt/bw/bw ~/backups me@example.com

Each run creates `<OUTPUT_DIR>/bwbackup_<timestamp>/` containing the vault
export, folder/item/organization listings, attachments, and per-organization
exports. The run directory also holds the master password in clear text
(`master_password.txt`, mode 0600); store backups accordingly.

Config:
  `.bwbackup.toml` is discovered from the working directory upwards, or set
  with `--config` / `BWBACKUP_CONFIG`.

Errors:
  Failures print `error[<code>]: <message>` to stderr and exit with status 1.
"#;

/// Top-level command line parser.
#[derive(Debug, Parser)]
#[command(
    name = "bwbackup",
    version,
    about = "Back up a Bitwarden vault, its attachments, and organization exports.",
    after_help = CLI_AFTER_HELP,
    next_line_help = true
)]
pub struct Cli {
    /// Backup root directory. Required unless `defaults.output_dir` is configured.
    pub output_dir: Option<PathBuf>,
    /// Vault account (email). Defaults to `$BW_USERID`, then config.
    #[arg(env = USER_ID_ENV_VAR)]
    pub user_id: Option<String>,
    /// Master password. Defaults to `$BW_PASSWORD`, else a masked prompt.
    #[arg(
        short = 'p',
        long = "bw-password",
        alias = "bw_password",
        env = PASSWORD_ENV_VAR,
        hide_env_values = true
    )]
    pub bw_password: Option<String>,
    /// Vault tool binary override. Default: `bw`, or `bw.binary` from config.
    #[arg(long)]
    pub bw_binary: Option<String>,
    /// Config file override path.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Disable config loading and discovery.
    #[arg(long)]
    pub no_config: bool,
    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Runs the CLI and returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    commands::run(cli)
}
