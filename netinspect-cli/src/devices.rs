//! `netinspect devices`: list what the device bridges can see.

use anyhow::Result;
use netinspect_certs::{AdbTransport, AndroidTransport, DeviceTarget, IdbTransport, IosTransport};
use netinspect_common::logging::Logger;
use netinspect_common::log_warn;
use std::path::PathBuf;

pub struct DevicesCommand {
    config_dir: PathBuf,
    logger: Logger,
}

impl DevicesCommand {
    pub fn new(config_dir: PathBuf, logger: &Logger) -> Self {
        Self {
            config_dir,
            logger: logger.clone(),
        }
    }

    /// A missing bridge is reported and skipped so the other platform still
    /// gets listed.
    pub async fn run(&self) -> Result<()> {
        let config = crate::load_config(&self.config_dir)?;

        let android = AdbTransport::new(&config.adb_binary, &self.logger);
        match android.list_online_targets().await {
            Ok(devices) => print_targets("Android", &devices),
            Err(e) => log_warn!(self.logger, "Could not list Android devices: {e}"),
        }

        let ios = IdbTransport::new(&config.idb_binary, &self.logger);
        match ios.list_targets().await {
            Ok(targets) => print_targets("iOS", &targets),
            Err(e) => log_warn!(self.logger, "Could not list iOS targets: {e}"),
        }
        Ok(())
    }
}

fn print_targets(platform: &str, targets: &[DeviceTarget]) {
    if targets.is_empty() {
        println!("{platform}: none");
        return;
    }
    println!("{platform}:");
    for target in targets {
        match &target.name {
            Some(name) => println!("  {} ({name})", target.id),
            None => println!("  {}", target.id),
        }
    }
}
