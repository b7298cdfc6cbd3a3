//! Host key loading.
//!
//! Stands in for the original's on-demand RSA keypair generation and
//! disk cache. Generates an ed25519 keypair on first run and writes it
//! to the configured paths; loads it back on subsequent runs.

use std::path::Path;

use anyhow::Context;
use russh_keys::key::KeyPair;
use tracing::info;

pub fn load_or_generate(public_key_path: &str, private_key_path: &str) -> anyhow::Result<KeyPair> {
    let priv_path = Path::new(private_key_path);
    let pub_path = Path::new(public_key_path);

    if priv_path.exists() && pub_path.exists() {
        info!(path = private_key_path, "loading cached host key");
        let key = russh_keys::load_secret_key(priv_path, None)
            .with_context(|| format!("loading host key from '{}'", private_key_path))?;
        return Ok(key);
    }

    info!(path = private_key_path, "generating new host key");
    let key = KeyPair::generate_ed25519().context("generating ed25519 host key")?;

    if let Some(parent) = priv_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating host key directory '{}'", parent.display()))?;
    }

    russh_keys::encode_pkcs8_pem(&key, priv_path)
        .with_context(|| format!("writing host private key to '{}'", private_key_path))?;

    let pubkey_line = russh_keys::PublicKeyBase64::public_key_base64(&key);
    std::fs::write(pub_path, format!("ssh-ed25519 {}\n", pubkey_line))
        .with_context(|| format!("writing host public key to '{}'", public_key_path))?;

    Ok(key)
}
