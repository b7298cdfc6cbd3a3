//! SSH Front Door (C7): wires configuration, host keys, the shared vfs
//! image, the accepted-password store, and the event sink into a
//! `russh` server, then hands each authenticated shell channel off to a
//! `Session`.
//!
//! Grounded on `libshpool/src/daemon/{mod,server}.rs`'s shape (a `run`
//! entry point that loads config-derived shared state once and then
//! listens), adapted from a Unix-socket accept loop under
//! `thread::spawn` to a `russh` TCP listener under `tokio::spawn` — one
//! task per connection either way.

mod server;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use tracing::info;

use crate::{config::Config, event, hostkeys, passwords::PasswordStore, vfs::VfsImage};

/// State shared read-only across every connection: the base vfs image,
/// the accepted-password store, and the event sink. Per §5, the only
/// cross-session mutable state is the password store and host keys, and
/// both are accessed open-read-close with no held lock.
pub struct Shared {
    pub config: Config,
    pub vfs_image: Arc<VfsImage>,
    pub password_store: Arc<PasswordStore>,
    pub event_sink: Arc<dyn event::EventSink>,
    pub txtcmds_path: Option<PathBuf>,
    pub lastlog_path: String,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!("honeyssh daemon starting");

    let key = hostkeys::load_or_generate(&config.public_key, &config.private_key)
        .context("loading or generating host keys")?;

    let vfs_image = match &config.filesystem_file {
        Some(path) => VfsImage::load(std::path::Path::new(path))
            .with_context(|| format!("loading vfs image from '{}'", path))?,
        None => {
            info!("no filesystem_file configured, using the minimal built-in image");
            VfsImage::minimal()
        }
    };

    let password_store_path = PathBuf::from(&config.data_path).join("passwords.txt");
    let password_store = Arc::new(PasswordStore::new(password_store_path));
    let event_sink: Arc<dyn event::EventSink> = Arc::from(event::build_sink(
        config.database.engine.as_deref(),
        config.database.path.as_deref(),
    ));
    let txtcmds_path = config.txtcmds_path.clone().map(PathBuf::from);
    let lastlog_path = PathBuf::from(&config.log_path).join("lastlog").to_string_lossy().into_owned();

    let shared = Arc::new(Shared {
        config: config.clone(),
        vfs_image,
        password_store,
        event_sink,
        txtcmds_path,
        lastlog_path,
    });

    let mut russh_config = russh::server::Config::default();
    russh_config.keys = vec![key];
    russh_config.auth_rejection_time = Duration::from_secs(1);
    russh_config.server_id = russh::SshId::Standard(config.server_version_string.clone());
    let russh_config = Arc::new(russh_config);

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    info!(addr = %addr, banner = %config.server_version_string, "listening for ssh connections");

    let ssh_server = server::SshServer::new(shared);
    russh::server::run(russh_config, addr, ssh_server)
        .await
        .context("running ssh server")?;
    Ok(())
}
