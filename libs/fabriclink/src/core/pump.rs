//! Bidirectional stream pump between host stdio and the fabric boundary
//! queues.
//!
//! Two independent directions share one poll(2) loop: forward moves stdin
//! into the fabric write queue, backward moves the fabric read queue onto
//! stdout. Each direction owns a single block buffer and is, at any moment,
//! in one of four states:
//!
//! - waiting for input: buffer empty, watching the source for readability
//! - flushing: buffer holds bytes, watching the sink for writability
//! - draining after end-of-stream: source is done but bytes remain unflushed
//! - quiescent: source done and everything flushed; no interest in either
//!   descriptor
//!
//! Exactly one of read-interest/write-interest is active per direction, so
//! a slow consumer stalls its producer at one block of buffered data and
//! bytes are forwarded in the order read, never duplicated.
//!
//! Termination: when the forward direction goes quiescent the wait narrows
//! to the remaining descriptors with a bounded idle timeout; an expired wait
//! ends the run, since the fabric read queue usually has no way to signal
//! end-of-stream. When the source descriptor does deliver one (a zero-length
//! read, as pipes and sockets do), the backward direction goes quiescent and
//! the run ends without waiting out the timeout.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

use tracing::{debug, trace};

use super::error::{FabricError, Result};
use super::fd;

/// Default transfer block size in bytes.
pub const DEFAULT_BLOCKSIZE: usize = 4096;

/// How long the pump waits for further backward traffic once the forward
/// direction has fully drained.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Bytes moved by a completed run, per direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpTotals {
    /// Bytes delivered into the fabric write queue.
    pub forwarded: u64,
    /// Bytes delivered onto stdout.
    pub returned: u64,
}

/// Owned block buffer with a consume cursor. Allocated once, reused for the
/// life of the run, never resized.
struct TransferBuffer {
    data: Vec<u8>,
    position: usize,
    remaining: usize,
}

impl TransferBuffer {
    fn new(blocksize: usize) -> Self {
        Self {
            data: vec![0; blocksize],
            position: 0,
            remaining: 0,
        }
    }

    /// The whole block, for refilling. Only valid while empty.
    fn writable(&mut self) -> &mut [u8] {
        debug_assert!(self.remaining == 0);
        &mut self.data
    }

    fn filled(&mut self, count: usize) {
        debug_assert!(count <= self.data.len());
        self.position = 0;
        self.remaining = count;
    }

    /// The unconsumed portion.
    fn pending(&self) -> &[u8] {
        &self.data[self.position..self.position + self.remaining]
    }

    fn consumed(&mut self, count: usize) {
        debug_assert!(count <= self.remaining);
        self.position += count;
        self.remaining -= count;
    }

    fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

/// One direction of the pump: a source descriptor, a sink descriptor, and
/// the block in flight between them.
struct Direction {
    source: libc::c_int,
    sink: libc::c_int,
    source_name: &'static str,
    sink_name: &'static str,
    buffer: TransferBuffer,
    eof: bool,
    delivered: u64,
}

impl Direction {
    fn new(
        source: libc::c_int,
        source_name: &'static str,
        sink: libc::c_int,
        sink_name: &'static str,
        blocksize: usize,
    ) -> Self {
        Self {
            source,
            sink,
            source_name,
            sink_name,
            buffer: TransferBuffer::new(blocksize),
            eof: false,
            delivered: 0,
        }
    }

    fn wants_source(&self) -> bool {
        !self.eof && self.buffer.is_empty()
    }

    fn wants_sink(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn is_quiescent(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }

    /// The source reported readiness: refill the buffer. A zero-length read
    /// is end-of-stream; "would block" leaves the state unchanged.
    fn service_source(&mut self) -> Result<()> {
        match fd::read(self.source, self.buffer.writable()) {
            Ok(0) => {
                debug!(source = self.source_name, "end of stream");
                self.eof = true;
            }
            Ok(count) => {
                trace!(source = self.source_name, count, "read block");
                self.buffer.filled(count);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(source) => {
                return Err(FabricError::IoFault {
                    target: self.source_name,
                    source,
                });
            }
        }
        Ok(())
    }

    /// The sink reported readiness: flush as much of the pending block as it
    /// accepts. A zero-length write of a non-empty block means the peer is
    /// gone; "would block" leaves the state unchanged.
    fn service_sink(&mut self) -> Result<()> {
        match fd::write(self.sink, self.buffer.pending()) {
            Ok(0) => return Err(FabricError::PeerClosed(self.sink_name)),
            Ok(count) => {
                trace!(sink = self.sink_name, count, "wrote block");
                self.buffer.consumed(count);
                self.delivered += count as u64;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(source) => {
                return Err(FabricError::IoFault {
                    target: self.sink_name,
                    source,
                });
            }
        }
        Ok(())
    }
}

/// The readiness-driven event loop moving bytes in both directions.
///
/// Single-threaded and lock-free: suspension happens only inside the
/// multiplexed wait, every read and write is non-blocking, and each
/// direction's buffer is touched by nothing but that direction's state
/// machine.
pub struct StreamPump {
    blocksize: usize,
    drain_timeout: Duration,
}

impl StreamPump {
    /// Create a pump with the given transfer block size.
    ///
    /// # Panics
    ///
    /// Panics if `blocksize` is zero.
    pub fn new(blocksize: usize) -> Self {
        assert!(blocksize >= 1, "blocksize must be at least 1 byte");
        Self {
            blocksize,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Override the post-end-of-input idle timeout.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Run until end-of-input has been forwarded and the backward direction
    /// has drained, or until a descriptor faults.
    ///
    /// All four descriptors are switched to non-blocking mode before the
    /// loop starts.
    pub fn run(
        &self,
        stdin: BorrowedFd<'_>,
        stdout: BorrowedFd<'_>,
        to_fabric: BorrowedFd<'_>,
        from_fabric: BorrowedFd<'_>,
    ) -> Result<PumpTotals> {
        for (fd, name) in [
            (stdin, "stdin"),
            (stdout, "stdout"),
            (to_fabric, "fabric write queue"),
            (from_fabric, "fabric read queue"),
        ] {
            fd::set_nonblocking(fd).map_err(|source| FabricError::IoFault {
                target: name,
                source,
            })?;
        }

        let mut forward = Direction::new(
            stdin.as_raw_fd(),
            "stdin",
            to_fabric.as_raw_fd(),
            "fabric write queue",
            self.blocksize,
        );
        let mut backward = Direction::new(
            from_fabric.as_raw_fd(),
            "fabric read queue",
            stdout.as_raw_fd(),
            "stdout",
            self.blocksize,
        );

        loop {
            let draining = forward.is_quiescent();
            if draining && backward.is_quiescent() {
                debug!("both directions drained");
                break;
            }

            // Interest follows state; descriptors without interest are
            // masked out entirely (negative fd) so a stray POLLHUP on them
            // cannot wake the loop.
            let mut fds = [
                poll_entry(forward.source, forward.wants_source(), libc::POLLIN),
                poll_entry(forward.sink, forward.wants_sink(), libc::POLLOUT),
                poll_entry(backward.source, backward.wants_source(), libc::POLLIN),
                poll_entry(backward.sink, backward.wants_sink(), libc::POLLOUT),
            ];
            let timeout = draining.then_some(self.drain_timeout);
            let ready = fd::poll(&mut fds, timeout).map_err(|source| FabricError::IoFault {
                target: "poll",
                source,
            })?;
            if ready == 0 {
                debug!("idle timeout after end of input, stopping");
                break;
            }

            if fds[0].revents != 0 {
                forward.service_source()?;
            }
            if fds[1].revents != 0 {
                forward.service_sink()?;
            }
            if fds[2].revents != 0 {
                backward.service_source()?;
            }
            if fds[3].revents != 0 {
                backward.service_sink()?;
            }
        }

        Ok(PumpTotals {
            forwarded: forward.delivered,
            returned: backward.delivered,
        })
    }
}

fn poll_entry(fd: libc::c_int, interested: bool, events: libc::c_short) -> libc::pollfd {
    libc::pollfd {
        fd: if interested { fd } else { -1 },
        events,
        revents: 0,
    }
}
