//! Resolving function names to programmed nodes and committing the route
//! chain.

use std::os::fd::OwnedFd;

use tracing::{debug, info};

use super::channel::acquire_queue_channel;
use super::control::{FabricControl, HOST_NODE, QueueDirection};
use super::error::{FabricError, Result};
use super::route::{RouteSegment, RouteTable};

/// A committed processing chain: the two boundary descriptors and the route
/// table that was installed to connect them.
#[derive(Debug)]
pub struct BuiltChain {
    /// Host end of the chain entry (write here to feed the first node).
    pub to_fabric: OwnedFd,
    /// Host end of the chain exit (read here to collect results).
    pub from_fabric: OwnedFd,
    /// Channel index of `to_fabric`.
    pub write_channel: u8,
    /// Channel index of `from_fabric`.
    pub read_channel: u8,
    /// Programmed node ids, in function order.
    pub nodes: Vec<u8>,
    pub table: RouteTable,
}

/// Builds one linear chain through the fabric.
///
/// For every requested function, in argument order: find candidate nodes,
/// reserve the first free one, program it, and extend the route. Runs once
/// at startup; nothing here is retried. The route table reaches the control
/// plane only after every step succeeded, so a failed build never leaves a
/// partial table installed (already-programmed nodes are left to the
/// process-exit cleanup, as with every other reservation).
pub struct PartitionChainBuilder<'a, C: FabricControl + ?Sized> {
    control: &'a mut C,
}

impl<'a, C: FabricControl + ?Sized> PartitionChainBuilder<'a, C> {
    pub fn new(control: &'a mut C) -> Self {
        Self { control }
    }

    /// Resolve, program and wire up every function, then install the route
    /// table as one batch.
    pub fn build(mut self, functions: &[impl AsRef<str>]) -> Result<BuiltChain> {
        let write = acquire_queue_channel(self.control, QueueDirection::ToFabric)?;

        let mut table = RouteTable::new();
        let mut endpoint = (HOST_NODE, write.index);
        let mut nodes = Vec::with_capacity(functions.len());
        for function in functions {
            let node = self.place_function(function.as_ref())?;
            table.push(RouteSegment::new(endpoint.0, endpoint.1, node, 0));
            endpoint = (node, 0);
            nodes.push(node);
        }

        let read = acquire_queue_channel(self.control, QueueDirection::FromFabric)?;
        table.push(RouteSegment::new(endpoint.0, endpoint.1, HOST_NODE, read.index));

        table.validate()?;
        self.control.install_routes(&table)?;
        info!(%table, "installed route chain");

        Ok(BuiltChain {
            to_fabric: write.fd,
            from_fabric: read.fd,
            write_channel: write.index,
            read_channel: read.index,
            nodes,
            table,
        })
    }

    /// Reserve and program a node for one function. Candidates are scanned
    /// in ascending id order; busy nodes are skipped. No candidate left
    /// means the function cannot run right now, which is fatal for the
    /// whole build.
    fn place_function(&mut self, function: &str) -> Result<u8> {
        let candidates = self.control.candidate_nodes(function)?;
        if candidates.is_empty() {
            return Err(FabricError::NotFound(format!(
                "function does not exist: {function}"
            )));
        }
        for node in candidates.iter() {
            match self.control.reserve_node(node) {
                Ok(()) => {
                    self.control.disable_node(node)?;
                    let bytes = self.control.program_node(node, function, None)?;
                    self.control.enable_node(node)?;
                    debug!(function, node, bytes, "programmed node");
                    return Ok(node);
                }
                Err(FabricError::Busy(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(FabricError::NotFound(format!(
            "function not available: {function}"
        )))
    }
}
