// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use fabriclink::device::stream_image;
use fabriclink::{DeviceContext, FabricControl};
use tracing::info;

/// Flash bitstream images to a node, or transcribe them to a file with
/// `--output` (useful for preparing images offline).
pub fn run(
    context: &mut DeviceContext,
    node: u8,
    output: Option<PathBuf>,
    files: &[PathBuf],
) -> Result<()> {
    if let Some(output) = output {
        ensure!(
            files.len() == 1,
            "--output takes exactly one input image"
        );
        return transcribe(&files[0], &output);
    }

    context
        .reserve_node(node)
        .with_context(|| format!("could not reserve node {node}"))?;
    context.disable_node(node)?;
    for file in files {
        let mut total = 0u64;
        let mut on_block = |block: &[u8]| total += block.len() as u64;
        context
            .program_file(node, file, Some(&mut on_block))
            .with_context(|| format!("failed to program {}", file.display()))?;
        info!(node, image = %file.display(), bytes = total, "programmed");
    }
    context.enable_node(node)?;
    Ok(())
}

fn transcribe(image: &Path, output: &Path) -> Result<()> {
    let mut source =
        File::open(image).with_context(|| format!("cannot open {}", image.display()))?;
    let mut sink =
        File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
    let bytes = stream_image(&mut source, &mut sink, None)?;
    info!(image = %image.display(), output = %output.display(), bytes, "transcribed");
    Ok(())
}
