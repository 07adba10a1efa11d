// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{Context, Result};
use clap::Subcommand;
use fabriclink::{DeviceContext, FabricControl};
use tracing::debug;

#[derive(Subcommand)]
pub enum LicenseCommand {
    /// Print the license key programmed into the fabric
    Read,

    /// Print the fabric device id
    Id,

    /// Program a license key (hex, with or without 0x)
    Write { key: String },
}

pub fn run(context: &mut DeviceContext, command: LicenseCommand) -> Result<()> {
    match command {
        LicenseCommand::Read => {
            let key = context.read_license()?;
            println!("{key:#x}");
        }
        LicenseCommand::Id => {
            let id = context.device_id()?;
            println!("{id:#x}");
        }
        LicenseCommand::Write { key } => {
            let digits = key
                .strip_prefix("0x")
                .or_else(|| key.strip_prefix("0X"))
                .unwrap_or(&key);
            let key = u64::from_str_radix(digits, 16)
                .with_context(|| format!("invalid license key '{key}'"))?;
            debug!(key, "programming license key");
            context.write_license(key)?;
        }
    }
    Ok(())
}
