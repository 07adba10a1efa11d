pub mod chain;
pub mod channel;
pub mod control;
pub mod error;
pub(crate) mod fd;
pub mod pump;
pub mod route;

pub use chain::{BuiltChain, PartitionChainBuilder};
pub use channel::{ChannelLease, acquire_queue_channel};
pub use control::{BlockHook, FabricControl, HOST_NODE, NODE_COUNT, NodeSet, QueueDirection};
pub use error::{FabricError, Result};
pub use pump::{DEFAULT_BLOCKSIZE, DEFAULT_DRAIN_TIMEOUT, PumpTotals, StreamPump};
pub use route::{RouteSegment, RouteTable};
