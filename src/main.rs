//! CLI entry point (C8).
//!
//! Grounded on the teacher's `main.rs` shape (a `clap` `Args`/`Subcommand`
//! pair, a `--log-file`/`--verbose` logging setup applied before the
//! subcommand runs) but rebuilt on `tracing-subscriber` instead of
//! `fern`, since nothing else in this crate reaches for `fern` and
//! `tracing` is already the logging facade every other module uses.

mod command;
mod commands;
mod config;
mod consts;
mod daemon;
mod error;
mod event;
mod hostkeys;
mod lastlog;
mod passwords;
mod session;
mod shell;
mod term;
mod ttylog;
mod vfs;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(version, author, about)]
struct Args {
    #[clap(short, long, action, help = "a toml file containing configuration")]
    config_file: Option<String>,
    #[clap(short, long, action, help = "the file to write logs to, stderr if unset")]
    log_file: Option<String>,
    #[clap(short, long, action = clap::ArgAction::Count,
           help = "show more in logs, may be provided multiple times")]
    verbose: u8,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[clap(help = "honeyssh-daemon runs the ssh server in the foreground")]
    Daemon,
    #[clap(help = "honeyssh-gen-keys forces regeneration of the ssh host key pair")]
    GenKeys,
}

fn init_logging(log_file: &Option<String>, verbose: u8) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file '{}'", path))?;
            builder.with_writer(file).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file, args.verbose)?;

    let config = config::read_config(&args.config_file).context("loading configuration")?;

    match args.command {
        Commands::Daemon => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;
            runtime.block_on(daemon::run(config))
        }
        Commands::GenKeys => {
            std::fs::remove_file(&config.private_key).ok();
            std::fs::remove_file(&config.public_key).ok();
            hostkeys::load_or_generate(&config.public_key, &config.private_key)
                .context("generating host key pair")?;
            println!("wrote new host key pair to '{}' and '{}'", config.private_key, config.public_key);
            Ok(())
        }
    }
}
