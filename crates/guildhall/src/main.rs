//! Guildhall server binary.
//!
//! # Usage
//!
//! ```bash
//! GUILDHALL_DISCORD__TOKEN=... guildhall --profile production
//! guildhall --config ./guildhall.toml --check-config
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use guildhall::runtime::{GuildhallRuntime, RuntimeBuilder};

#[derive(Debug, Parser)]
#[command(
    name = "guildhall",
    version,
    about = "Discord bot dashboard bridge"
)]
struct Args {
    /// Configuration file; replaces the search for `guildhall.toml`.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Configuration profile (`development`, `production` or a custom name).
    #[arg(long, short, env = "GUILDHALL_PROFILE")]
    profile: Option<String>,

    /// Load and validate the configuration, then exit.
    #[arg(long, default_value_t = false)]
    check_config: bool,
}

impl Args {
    fn builder(&self) -> RuntimeBuilder {
        let mut builder = GuildhallRuntime::builder();
        if let Some(path) = &self.config {
            builder = builder.config_file(path);
        }
        if let Some(profile) = &self.profile {
            builder = builder.profile(profile);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.check_config {
        let config = args.builder().load().context("invalid configuration")?;
        println!(
            "Configuration OK: dashboard on {}{}, gateway {}",
            config.server.bind_addr(),
            config.server.push_path,
            if config.discord.enabled { "enabled" } else { "disabled" },
        );
        return Ok(());
    }

    let runtime = args.builder().build().context("failed to load configuration")?;
    runtime.run().await?;
    Ok(())
}
