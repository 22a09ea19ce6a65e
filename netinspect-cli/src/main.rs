//! Netinspect CLI - pairing CA and device provisioning
//!
//! Creates the local certificate authority, checks the server identity used
//! by the inspection proxy and provisions apps from their CSR.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netinspect_certs::{ClientOs, ExchangeMedium};
use netinspect_cli::{
    default_config_dir, DevicesCommand, EnsureCommand, ProvisionCommand, ServerConfigCommand,
};
use netinspect_common::logging::{Component, Logger};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "netinspect")]
#[command(about = "Netinspect pairing CA - issue and deploy device certificates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration directory (default: ~/.config/netinspect)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or repair the CA and server certificate
    #[command(name = "ensure")]
    Ensure,
    /// Validate the server identity and print its location
    #[command(name = "server-config")]
    ServerConfig {
        /// Also print the CA certificate PEM
        #[arg(long)]
        print_ca: bool,
    },
    /// List devices visible through adb and idb
    #[command(name = "devices")]
    Devices,
    /// Sign a CSR and deploy the certificates to the app
    #[command(name = "provision")]
    Provision {
        /// PEM encoded CSR written by the app
        #[arg(long)]
        csr: PathBuf,
        /// Android, iOS, Windows or MacOS
        #[arg(long)]
        os: ClientOs,
        /// Certificate directory reported by the app
        #[arg(long)]
        app_dir: String,
        /// FS_ACCESS or WWW
        #[arg(long, default_value = "FS_ACCESS")]
        medium: ExchangeMedium,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let logger = Logger::new_root(Component::CLI, "main");

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {config_dir:?}"))?;

    match cli.command {
        Commands::Ensure => EnsureCommand::new(config_dir, &logger).run().await?,
        Commands::ServerConfig { print_ca } => {
            ServerConfigCommand::new(config_dir, &logger)
                .run(print_ca)
                .await?
        }
        Commands::Devices => DevicesCommand::new(config_dir, &logger).run().await?,
        Commands::Provision {
            csr,
            os,
            app_dir,
            medium,
        } => {
            ProvisionCommand::new(config_dir, &logger)
                .run(&csr, os, &app_dir, medium)
                .await?
        }
    }

    Ok(())
}
