// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::io::{stdin, stdout};
use std::os::fd::AsFd;

use anyhow::{Context, Result, ensure};
use fabriclink::{DeviceContext, PartitionChainBuilder, StreamPump};
use tracing::info;

/// Build the requested chain, then pump stdin/stdout through it until
/// end-of-input has drained. stdout carries the data stream; everything
/// else goes to stderr.
pub fn run(context: &mut DeviceContext, blocksize: usize, functions: &[String]) -> Result<()> {
    ensure!(blocksize > 0, "invalid blocksize: must be at least 1 byte");

    let chain = PartitionChainBuilder::new(context)
        .build(functions)
        .context("failed to build the processing chain")?;
    info!(
        write_channel = chain.write_channel,
        read_channel = chain.read_channel,
        nodes = ?chain.nodes,
        "chain committed"
    );

    let stdin = stdin();
    let stdout = stdout();
    let totals = StreamPump::new(blocksize)
        .run(
            stdin.as_fd(),
            stdout.as_fd(),
            chain.to_fabric.as_fd(),
            chain.from_fabric.as_fd(),
        )
        .context("stream transfer failed")?;
    info!(
        forwarded = totals.forwarded,
        returned = totals.returned,
        "stream complete"
    );
    Ok(())
}
