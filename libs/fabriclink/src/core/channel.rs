//! First-fit allocation of host-facing queue channels.

use std::os::fd::OwnedFd;

use tracing::debug;

use super::control::{FabricControl, NODE_COUNT, QueueDirection};
use super::error::{FabricError, Result};

/// An open host-facing queue channel.
///
/// The channel stays reserved for as long as the descriptor is open; there
/// is no separate release operation.
#[derive(Debug)]
pub struct ChannelLease {
    pub fd: OwnedFd,
    pub index: u8,
}

/// Scan channel indices in ascending order and open the first free one.
///
/// A busy channel just moves the scan along; any other open failure means
/// the queue subsystem itself is missing or broken and aborts immediately.
/// Exhausting all indices is a [`FabricError::ResourceExhausted`].
pub fn acquire_queue_channel<C: FabricControl + ?Sized>(
    control: &mut C,
    direction: QueueDirection,
) -> Result<ChannelLease> {
    for index in 0..NODE_COUNT {
        match control.open_queue(index, direction) {
            Ok(fd) => {
                debug!(index, ?direction, "acquired queue channel");
                return Ok(ChannelLease { fd, index });
            }
            Err(FabricError::Busy(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Err(FabricError::ResourceExhausted("host-facing queue channels"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::NodeSet;
    use crate::core::route::RouteTable;
    use std::collections::HashSet;
    use std::fs::File;

    struct FakeQueues {
        busy: HashSet<u8>,
        probed: Vec<u8>,
        broken: bool,
    }

    impl FabricControl for FakeQueues {
        fn candidate_nodes(&self, _function: &str) -> Result<NodeSet> {
            Ok(NodeSet::default())
        }

        fn reserve_node(&mut self, _node: u8) -> Result<()> {
            Ok(())
        }

        fn disable_node(&mut self, _node: u8) -> Result<()> {
            Ok(())
        }

        fn enable_node(&mut self, _node: u8) -> Result<()> {
            Ok(())
        }

        fn program_node(
            &mut self,
            _node: u8,
            _function: &str,
            _on_block: Option<crate::core::control::BlockHook<'_>>,
        ) -> Result<u64> {
            Ok(0)
        }

        fn open_queue(&mut self, index: u8, _direction: QueueDirection) -> Result<OwnedFd> {
            self.probed.push(index);
            if self.broken {
                return Err(std::io::Error::other("queue subsystem gone").into());
            }
            if self.busy.contains(&index) {
                return Err(FabricError::Busy(format!("queue channel {index}")));
            }
            Ok(OwnedFd::from(File::open("/dev/null")?))
        }

        fn install_routes(&mut self, _table: &RouteTable) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_first_free_channel() {
        let mut control = FakeQueues {
            busy: HashSet::new(),
            probed: Vec::new(),
            broken: false,
        };
        let lease = acquire_queue_channel(&mut control, QueueDirection::ToFabric).unwrap();
        assert_eq!(lease.index, 0);
        assert_eq!(control.probed, vec![0]);
    }

    #[test]
    fn test_skips_busy_ascending() {
        let mut control = FakeQueues {
            busy: HashSet::from([0, 1, 2]),
            probed: Vec::new(),
            broken: false,
        };
        let lease = acquire_queue_channel(&mut control, QueueDirection::FromFabric).unwrap();
        assert_eq!(lease.index, 3);
        assert_eq!(control.probed, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_exhaustion() {
        let mut control = FakeQueues {
            busy: (0..32).collect(),
            probed: Vec::new(),
            broken: false,
        };
        let err = acquire_queue_channel(&mut control, QueueDirection::ToFabric).unwrap_err();
        assert!(matches!(err, FabricError::ResourceExhausted(_)));
        assert_eq!(control.probed.len(), 32);
    }

    #[test]
    fn test_hard_failure_stops_scan() {
        let mut control = FakeQueues {
            busy: HashSet::new(),
            probed: Vec::new(),
            broken: true,
        };
        let err = acquire_queue_channel(&mut control, QueueDirection::ToFabric).unwrap_err();
        assert!(matches!(err, FabricError::Io(_)));
        assert_eq!(control.probed, vec![0]);
    }
}
