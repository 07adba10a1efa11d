// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{Context, Result};
use clap::Subcommand;
use fabriclink::{DeviceContext, FabricControl, RouteTable};
use tracing::debug;

#[derive(Subcommand)]
pub enum RouteCommand {
    /// Install route segments, given as "srcNode,srcFifo,dstNode,dstFifo"
    ///
    /// Segments are installed exactly as given, as one batch; unlike the
    /// proxy command, no chain shape is enforced.
    Add {
        #[arg(required = true)]
        segments: Vec<String>,
    },

    /// Print the installed route table
    List {
        /// Emit JSON instead of one segment per line
        #[arg(long)]
        json: bool,
    },

    /// Remove routes: all of them, or those touching one node
    Clear {
        /// Only remove routes with this node as source or destination
        #[arg(long)]
        node: Option<u8>,
    },
}

pub fn run(context: &mut DeviceContext, command: RouteCommand) -> Result<()> {
    match command {
        RouteCommand::Add { segments } => {
            let mut table = RouteTable::new();
            for segment in &segments {
                let segment = segment
                    .parse()
                    .with_context(|| format!("bad route segment '{segment}'"))?;
                debug!(%segment, "parsed route segment");
                table.push(segment);
            }
            context.install_routes(&table)?;
        }
        RouteCommand::List { json } => {
            let routes = context.list_routes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&routes)?);
            } else {
                for route in &routes {
                    println!("{route}");
                }
            }
        }
        RouteCommand::Clear { node } => match node {
            Some(node) => context.clear_routes_for_node(node)?,
            None => context.clear_routes()?,
        },
    }
    Ok(())
}
