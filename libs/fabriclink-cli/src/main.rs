// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! fabriclink CLI
//!
//! Command-line tools for the reconfigurable compute fabric: stream data
//! through chains of hardware functions, edit the route table, flash
//! bitstream images, and manage the license key.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fabriclink::DeviceContext;

mod commands;

#[derive(Parser)]
#[command(name = "fabriclink")]
#[command(author, version, about = "Fabric routing and stream utilities", long_about = None)]
struct Cli {
    /// Device directory holding the fabric control plane
    #[arg(long, global = true)]
    device_root: Option<PathBuf>,

    /// Directory holding per-function bitstream images
    #[arg(long, global = true)]
    firmware_root: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "fabriclink=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pump stdin through a chain of fabric functions to stdout
    ///
    /// Nodes are allocated and programmed automatically; multiple functions
    /// are linked in hardware, in argument order.
    #[command(
        after_help = "Example: mpg123 -s music.mp3 | fabriclink proxy lowpass reverb | aplay -f cd"
    )]
    Proxy {
        /// Transfer block size in bytes
        #[arg(short = 's', long, default_value_t = fabriclink::DEFAULT_BLOCKSIZE)]
        blocksize: usize,

        /// Functions to link, in order
        #[arg(required = true)]
        functions: Vec<String>,
    },

    /// Inspect and edit the installed route table
    Route {
        #[command(subcommand)]
        command: commands::route::RouteCommand,
    },

    /// Stream bitstream images to a node's configuration device
    Program {
        /// Target node id
        #[arg(long)]
        node: u8,

        /// Write the processed stream to a file instead of the hardware
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bitstream images to flash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Read or write the fabric license key
    License {
        #[command(subcommand)]
        command: commands::license::LicenseCommand,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut context = DeviceContext::with_roots(
        cli.device_root
            .clone()
            .unwrap_or_else(fabriclink::device::default_dev_root),
        cli.firmware_root
            .clone()
            .unwrap_or_else(fabriclink::device::default_firmware_root),
    );

    match cli.command {
        Commands::Proxy {
            blocksize,
            functions,
        } => commands::proxy::run(&mut context, blocksize, &functions),
        Commands::Route { command } => commands::route::run(&mut context, command),
        Commands::Program {
            node,
            output,
            files,
        } => commands::program::run(&mut context, node, output, &files),
        Commands::License { command } => commands::license::run(&mut context, command),
    }
}

/// Diagnostics go to stderr; stdout stays clean for command output (and for
/// the proxy data stream).
fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = match filter {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
