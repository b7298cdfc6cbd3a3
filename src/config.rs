//! Configuration loading.
//!
//! Mirrors the daemon's `read_config`: an explicit `--config-file` is
//! preferred, otherwise a conventional path is probed and silently
//! skipped if absent. Unlike the daemon's config, every field here has
//! a default, so the honeypot always starts even with no config file.

use std::{fs, path::Path};

use anyhow::Context;
use serde_derive::Deserialize;

use crate::consts;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Hostname shown in the fake shell prompt.
    pub hostname: String,

    /// Plaintext password accepted for the `root` user, in addition to
    /// anything already present in the accepted-password store.
    pub password: Option<String>,

    /// Directory holding the accepted-password store (see
    /// `passwords.rs`). Defaults to the current directory.
    pub data_path: String,

    /// Parent directory of the `tty/` session log directory.
    pub log_path: String,

    /// Path to the serialized vfs snapshot loaded at startup.
    pub filesystem_file: Option<String>,

    /// Directory of canned-response files consulted by the txtcmd
    /// lookup in the session orchestrator.
    pub txtcmds_path: Option<String>,

    /// SSH host public key path. Generated on first run if absent.
    pub public_key: String,

    /// SSH host private key path. Generated on first run if absent.
    pub private_key: String,

    /// Address to listen on.
    pub listen_addr: String,

    /// Port to listen on.
    pub listen_port: u16,

    /// Version string presented during the SSH banner exchange.
    pub server_version_string: String,

    /// Selects the event sink implementation. Currently recognizes
    /// "jsonl"; anything else (including absence) selects the no-op
    /// sink.
    pub database: DatabaseConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: Option<String>,
    pub path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hostname: "svr03".to_string(),
            password: None,
            data_path: "./data".to_string(),
            log_path: "./log".to_string(),
            filesystem_file: None,
            txtcmds_path: None,
            public_key: "./data/ssh_host_key.pub".to_string(),
            private_key: "./data/ssh_host_key".to_string(),
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 2222,
            server_version_string: consts::DEFAULT_VERSION_STRING.to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Loads config from `config_file` if given, else from the conventional
/// `~/.config/honeyssh/config.toml` if it exists, else falls back to
/// `Config::default()`.
pub fn read_config(config_file: &Option<String>) -> anyhow::Result<Config> {
    if let Some(path) = config_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file '{}'", path))?;
        return parse(&contents);
    }

    if let Some(home) = std::env::var_os("HOME") {
        let default_path = Path::new(&home).join(".config/honeyssh/config.toml");
        if default_path.exists() {
            let contents = fs::read_to_string(&default_path)
                .with_context(|| format!("reading config file '{}'", default_path.display()))?;
            return parse(&contents);
        }
    }

    Ok(Config::default())
}

fn parse(contents: &str) -> anyhow::Result<Config> {
    toml::from_str(contents).context("parsing config toml")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.hostname, "svr03");
        assert_eq!(cfg.listen_port, 2222);
    }

    #[test]
    fn overrides_apply() {
        let cfg: Config = toml::from_str(
            r#"
            hostname = "prod-db-1"
            listen_port = 22
            password = "123456"

            [database]
            engine = "jsonl"
            path = "/var/log/honeyssh/events.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.hostname, "prod-db-1");
        assert_eq!(cfg.listen_port, 22);
        assert_eq!(cfg.password.as_deref(), Some("123456"));
        assert_eq!(cfg.database.engine.as_deref(), Some("jsonl"));
    }

    #[test]
    fn read_config_with_no_args_or_home_file_falls_back_to_default() {
        let cfg = read_config(&None).unwrap();
        assert_eq!(cfg.listen_port, 2222);
    }
}
