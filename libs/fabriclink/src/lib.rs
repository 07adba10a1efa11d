// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Routing, allocation and stream plumbing for a reconfigurable compute
//! fabric.
//!
//! The fabric exposes up to 31 reprogrammable compute nodes and two banks
//! of host-facing queue channels. This crate turns a list of function names
//! into a committed processing chain (reserve nodes, program them, install
//! the route table as one batch) and then pumps bytes between the host's
//! standard streams and the chain's boundary queues with a single-threaded,
//! readiness-driven event loop.
//!
//! - [`core::control`]: the [`FabricControl`] trait the rest of the crate
//!   talks to
//! - [`core::route`]: route segments and the route table
//! - [`core::channel`]: first-fit host-facing queue channel allocation
//! - [`core::chain`]: the chain builder
//! - [`core::pump`]: the bidirectional stream pump
//! - [`device`]: the Linux character-device implementation of
//!   [`FabricControl`]

pub mod core;
pub mod device;

pub use core::chain::{BuiltChain, PartitionChainBuilder};
pub use core::channel::{ChannelLease, acquire_queue_channel};
pub use core::control::{BlockHook, FabricControl, HOST_NODE, NODE_COUNT, NodeSet, QueueDirection};
pub use core::error::{FabricError, Result};
pub use core::pump::{DEFAULT_BLOCKSIZE, DEFAULT_DRAIN_TIMEOUT, PumpTotals, StreamPump};
pub use core::route::{RouteSegment, RouteTable};
pub use device::DeviceContext;
