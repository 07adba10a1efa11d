// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linux character-device backend for the fabric control plane.
//!
//! The driver exposes a directory of device nodes (default
//! `/dev/fabriclink`):
//!
//! - `ctl`: control device. Accepts single-line textual commands
//!   (`up N` / `down N`, `route S.F D.F`, `route clear [N]`, one command per
//!   line); reading it back returns the installed route list as `S.F D.F`
//!   lines. A whole batch of route lines is submitted in one write(2) call,
//!   which is what makes batch installation atomic from the caller's side.
//! - `cfg{N}`: per-node configuration device, `N` in `1..32`. Opening it
//!   read-write takes the node's exclusive configuration reservation
//!   (`EBUSY` while someone else holds it); bitstream bytes are streamed
//!   into this descriptor to program the node.
//! - `w{N}` / `r{N}`: host-facing write/read queue channels, `N` in
//!   `0..32`. `EBUSY` on open means the channel is in use.
//! - `license` / `id`: license key and device id as hexadecimal text.
//!
//! Function images live in a firmware repository (default
//! `/usr/share/fabriclink/functions`): one directory per function name
//! holding `<node>.bin` images, one per node the function was synthesized
//! for. Which nodes can host a function is exactly which images exist.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::core::control::{
    BlockHook, FabricControl, HOST_NODE, NODE_COUNT, NodeSet, QueueDirection,
};
use crate::core::error::{FabricError, Result};
use crate::core::route::{RouteSegment, RouteTable};

pub const DEFAULT_DEV_ROOT: &str = "/dev/fabriclink";
pub const DEFAULT_FIRMWARE_ROOT: &str = "/usr/share/fabriclink/functions";

/// Environment override for the device directory.
pub const DEV_ROOT_ENV: &str = "FABRICLINK_DEV_ROOT";
/// Environment override for the firmware repository.
pub const FIRMWARE_ROOT_ENV: &str = "FABRICLINK_FIRMWARE_ROOT";

/// Staging block size for streaming bitstream images into a node.
const PROGRAM_BLOCK: usize = 64 * 1024;

/// Driver-backed implementation of [`FabricControl`].
///
/// Node configuration reservations are the open `cfg{N}` descriptors held
/// in this struct; they are not released before the process exits.
#[derive(Debug)]
pub struct DeviceContext {
    dev_root: PathBuf,
    firmware_root: PathBuf,
    reservations: HashMap<u8, File>,
}

impl DeviceContext {
    /// Context over the default device tree, honoring the
    /// `FABRICLINK_DEV_ROOT` / `FABRICLINK_FIRMWARE_ROOT` overrides.
    pub fn new() -> Self {
        Self::with_roots(default_dev_root(), default_firmware_root())
    }

    pub fn with_roots(dev_root: impl Into<PathBuf>, firmware_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            firmware_root: firmware_root.into(),
            reservations: HashMap::new(),
        }
    }

    /// Path of the image that programs `function` onto `node`.
    pub fn firmware_image(&self, function: &str, node: u8) -> PathBuf {
        self.firmware_root.join(function).join(format!("{node}.bin"))
    }

    /// Stream an arbitrary image file into a reserved node. The `program`
    /// command uses this to flash images that are not in the repository.
    pub fn program_file(
        &mut self,
        node: u8,
        image: &Path,
        on_block: Option<BlockHook<'_>>,
    ) -> Result<u64> {
        let mut source = File::open(image)?;
        let sink = self
            .reservations
            .get_mut(&node)
            .ok_or(FabricError::NotSupported(
                "programming a node without a configuration reservation",
            ))?;
        let bytes = stream_image(&mut source, sink, on_block)?;
        debug!(node, image = %image.display(), bytes, "programmed image");
        Ok(bytes)
    }

    fn cfg_path(&self, node: u8) -> PathBuf {
        self.dev_root.join(format!("cfg{node}"))
    }

    fn queue_path(&self, index: u8, direction: QueueDirection) -> PathBuf {
        let prefix = match direction {
            QueueDirection::ToFabric => 'w',
            QueueDirection::FromFabric => 'r',
        };
        self.dev_root.join(format!("{prefix}{index}"))
    }

    /// Send one or more command lines to the control device in a single
    /// write(2) call.
    fn ctl_write(&self, commands: &str) -> Result<()> {
        let path = self.dev_root.join("ctl");
        let run = || -> io::Result<()> {
            let mut ctl = OpenOptions::new().append(true).open(&path)?;
            let count = ctl.write(commands.as_bytes())?;
            if count != commands.len() {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "control device accepted a partial command",
                ));
            }
            Ok(())
        };
        trace!(commands, "control write");
        run().map_err(|source| FabricError::IoFault {
            target: "control device",
            source,
        })
    }

    fn ctl_read(&self) -> Result<String> {
        fs::read_to_string(self.dev_root.join("ctl")).map_err(|source| FabricError::IoFault {
            target: "control device",
            source,
        })
    }

    fn read_hex_device(&self, name: &'static str) -> Result<u64> {
        let text = fs::read_to_string(self.dev_root.join(name))
            .map_err(|source| FabricError::IoFault { target: name, source })?;
        parse_hex(text.trim())
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FabricControl for DeviceContext {
    fn candidate_nodes(&self, function: &str) -> Result<NodeSet> {
        let mut candidates = NodeSet::default();
        let directory = self.firmware_root.join(function);
        let entries = match fs::read_dir(&directory) {
            Ok(entries) => entries,
            // No repository directory means the function does not exist.
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(candidates),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "bin") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(node) = stem.parse::<u8>() {
                if node != HOST_NODE && node < NODE_COUNT {
                    candidates.insert(node);
                }
            }
        }
        trace!(function, mask = candidates.raw(), "candidate scan");
        Ok(candidates)
    }

    fn reserve_node(&mut self, node: u8) -> Result<()> {
        if node == HOST_NODE || node >= NODE_COUNT {
            return Err(FabricError::NotFound(format!("no such node: {node}")));
        }
        if self.reservations.contains_key(&node) {
            return Err(FabricError::Busy(format!("node {node}")));
        }
        let cfg = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.cfg_path(node))
            .map_err(|err| {
                if is_busy(&err) {
                    FabricError::Busy(format!("node {node}"))
                } else {
                    err.into()
                }
            })?;
        debug!(node, "reserved node configuration");
        self.reservations.insert(node, cfg);
        Ok(())
    }

    fn disable_node(&mut self, node: u8) -> Result<()> {
        self.ctl_write(&format!("down {node}\n"))
    }

    fn enable_node(&mut self, node: u8) -> Result<()> {
        self.ctl_write(&format!("up {node}\n"))
    }

    fn program_node(
        &mut self,
        node: u8,
        function: &str,
        on_block: Option<BlockHook<'_>>,
    ) -> Result<u64> {
        let image = self.firmware_image(function, node);
        self.program_file(node, &image, on_block)
    }

    fn open_queue(&mut self, index: u8, direction: QueueDirection) -> Result<OwnedFd> {
        let path = self.queue_path(index, direction);
        let mut options = OpenOptions::new();
        match direction {
            QueueDirection::ToFabric => options.write(true),
            QueueDirection::FromFabric => options.read(true),
        };
        let queue = options.open(&path).map_err(|err| {
            if is_busy(&err) {
                FabricError::Busy(format!("queue channel {index}"))
            } else {
                FabricError::from(err)
            }
        })?;
        Ok(OwnedFd::from(queue))
    }

    fn install_routes(&mut self, table: &RouteTable) -> Result<()> {
        if table.is_empty() {
            return Ok(());
        }
        self.ctl_write(&format_route_batch(table))
    }

    fn list_routes(&mut self) -> Result<Vec<RouteSegment>> {
        let mut routes = Vec::new();
        for line in self.ctl_read()?.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            routes.push(line.parse()?);
        }
        Ok(routes)
    }

    fn clear_routes(&mut self) -> Result<()> {
        self.ctl_write("route clear\n")
    }

    fn clear_routes_for_node(&mut self, node: u8) -> Result<()> {
        self.ctl_write(&format!("route clear {node}\n"))
    }

    fn read_license(&mut self) -> Result<u64> {
        self.read_hex_device("license")
    }

    fn write_license(&mut self, key: u64) -> Result<()> {
        let path = self.dev_root.join("license");
        let run = || -> io::Result<()> {
            let mut device = OpenOptions::new().write(true).open(&path)?;
            device.write_all(format!("{key:#x}\n").as_bytes())
        };
        run().map_err(|source| FabricError::IoFault {
            target: "license",
            source,
        })
    }

    fn device_id(&mut self) -> Result<u64> {
        self.read_hex_device("id")
    }
}

/// Device directory from the environment, or the built-in default.
pub fn default_dev_root() -> PathBuf {
    std::env::var_os(DEV_ROOT_ENV).map_or_else(|| PathBuf::from(DEFAULT_DEV_ROOT), PathBuf::from)
}

/// Firmware repository from the environment, or the built-in default.
pub fn default_firmware_root() -> PathBuf {
    std::env::var_os(FIRMWARE_ROOT_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_FIRMWARE_ROOT), PathBuf::from)
}

/// Copy an opaque bitstream from `source` to `sink` in staging blocks,
/// handing each block to the inspection hook. Returns the byte count.
pub fn stream_image(
    source: &mut dyn Read,
    sink: &mut dyn Write,
    mut on_block: Option<BlockHook<'_>>,
) -> Result<u64> {
    let mut block = vec![0u8; PROGRAM_BLOCK];
    let mut total = 0u64;
    loop {
        let count = source.read(&mut block)?;
        if count == 0 {
            return Ok(total);
        }
        if let Some(on_block) = on_block.as_mut() {
            on_block(&block[..count]);
        }
        sink.write_all(&block[..count])?;
        total += count as u64;
    }
}

fn format_route_batch(table: &RouteTable) -> String {
    let mut batch = String::new();
    for segment in table {
        batch.push_str(&format!(
            "route {}.{} {}.{}\n",
            segment.src_node, segment.src_fifo, segment.dst_node, segment.dst_fifo
        ));
    }
    batch
}

fn parse_hex(text: &str) -> Result<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|_| FabricError::Parse {
        input: text.to_string(),
        what: "hex value",
    })
}

fn is_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EBUSY)
}
