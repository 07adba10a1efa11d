// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end pump behavior over socket pairs standing in for the four
//! descriptors. A thread on the fabric side echoes the write queue back
//! into the read queue, which is what a committed passthrough chain looks
//! like to the host.

use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::{Duration, Instant};

use fabriclink::{FabricError, PumpTotals, StreamPump};

/// Test data with no short period, so reordered or duplicated chunks can't
/// cancel out.
fn patterned(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u64).wrapping_mul(2654435761).to_le_bytes()[0] ^ (i >> 11) as u8)
        .collect()
}

/// Run the pump with `input` on stdin and a fabric that echoes everything
/// back. Returns the totals and the bytes that came out on stdout.
fn run_loopback(input: Vec<u8>, blocksize: usize, close_fabric: bool) -> (PumpTotals, Vec<u8>) {
    let (pump_stdin, mut feeder) = UnixStream::pair().unwrap();
    let (pump_stdout, mut collector_end) = UnixStream::pair().unwrap();
    let (to_fabric, mut fabric_in) = UnixStream::pair().unwrap();
    let (from_fabric, mut fabric_out) = UnixStream::pair().unwrap();

    let feeder = thread::spawn(move || {
        feeder.write_all(&input).unwrap();
        // Dropping the stream delivers end-of-input to the pump.
    });

    let echo = thread::spawn(move || {
        let mut block = [0u8; 1024];
        loop {
            match fabric_in.read(&mut block) {
                Ok(0) | Err(_) => break,
                Ok(count) => {
                    if fabric_out.write_all(&block[..count]).is_err() {
                        break;
                    }
                }
            }
        }
        if !close_fabric {
            // Keep the read queue open so the pump has to time out.
            thread::park_timeout(Duration::from_secs(5));
        }
    });

    let collector = thread::spawn(move || {
        let mut output = Vec::new();
        collector_end.read_to_end(&mut output).unwrap();
        output
    });

    let totals = StreamPump::new(blocksize)
        .with_drain_timeout(Duration::from_millis(100))
        .run(
            pump_stdin.as_fd(),
            pump_stdout.as_fd(),
            to_fabric.as_fd(),
            from_fabric.as_fd(),
        )
        .unwrap();

    // Closing our ends lets the echo and collector threads finish.
    drop(to_fabric);
    drop(from_fabric);
    drop(pump_stdout);
    feeder.join().unwrap();
    let output = collector.join().unwrap();
    if close_fabric {
        echo.join().unwrap();
    }
    (totals, output)
}

#[test]
fn test_forwards_in_order_without_loss() {
    let input = patterned(1 << 20);
    let (totals, output) = run_loopback(input.clone(), 4096, true);

    assert_eq!(output, input);
    assert_eq!(totals.forwarded, input.len() as u64);
    assert_eq!(totals.returned, input.len() as u64);
}

#[test]
fn test_tiny_blocksize_preserves_order() {
    let input = patterned(100_000);
    let (totals, output) = run_loopback(input.clone(), 7, true);

    assert_eq!(output, input);
    assert_eq!(totals.forwarded, input.len() as u64);
}

#[test]
fn test_empty_input() {
    let started = Instant::now();
    let (totals, output) = run_loopback(Vec::new(), 4096, true);

    assert_eq!(totals, PumpTotals::default());
    assert!(output.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_terminates_by_idle_timeout_when_fabric_stays_open() {
    let input = patterned(64 * 1024);
    let started = Instant::now();
    let (totals, output) = run_loopback(input.clone(), 4096, false);

    assert_eq!(output, input);
    assert_eq!(totals.returned, input.len() as u64);
    // One idle-timeout interval after the last byte, give or take
    // scheduling: well under the park timeout the echo thread sleeps for.
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_stops_early_when_fabric_signals_closure() {
    // The fabric closes its read queue after returning the last block, so
    // the pump finishes without waiting out the (deliberately long) idle
    // timeout.
    let (pump_stdin, mut feeder) = UnixStream::pair().unwrap();
    let (pump_stdout, mut collector_end) = UnixStream::pair().unwrap();
    let (to_fabric, mut fabric_in) = UnixStream::pair().unwrap();
    let (from_fabric, mut fabric_out) = UnixStream::pair().unwrap();

    feeder.write_all(b"ping").unwrap();
    drop(feeder);

    let echo = thread::spawn(move || {
        let mut block = [0u8; 4];
        fabric_in.read_exact(&mut block).unwrap();
        fabric_out.write_all(&block).unwrap();
        // Dropping fabric_out delivers end-of-stream on the read queue.
    });

    let collector = thread::spawn(move || {
        let mut output = Vec::new();
        collector_end.read_to_end(&mut output).unwrap();
        output
    });

    let started = Instant::now();
    let totals = StreamPump::new(4096)
        .with_drain_timeout(Duration::from_secs(30))
        .run(
            pump_stdin.as_fd(),
            pump_stdout.as_fd(),
            to_fabric.as_fd(),
            from_fabric.as_fd(),
        )
        .unwrap();

    assert_eq!(totals.forwarded, 4);
    assert_eq!(totals.returned, 4);
    assert!(started.elapsed() < Duration::from_secs(5));

    drop(pump_stdout);
    assert_eq!(collector.join().unwrap(), b"ping");
    echo.join().unwrap();
}

#[test]
fn test_faults_when_stdout_goes_away() {
    let (pump_stdin, mut feeder) = UnixStream::pair().unwrap();
    let (pump_stdout, collector_end) = UnixStream::pair().unwrap();
    let (to_fabric, mut fabric_in) = UnixStream::pair().unwrap();
    let (from_fabric, mut fabric_out) = UnixStream::pair().unwrap();

    drop(collector_end); // nobody is reading stdout

    let echo = thread::spawn(move || {
        let mut block = [0u8; 1024];
        while let Ok(count) = fabric_in.read(&mut block) {
            if count == 0 || fabric_out.write_all(&block[..count]).is_err() {
                break;
            }
        }
    });

    feeder.write_all(b"some bytes").unwrap();
    drop(feeder);

    let err = StreamPump::new(4096)
        .run(
            pump_stdin.as_fd(),
            pump_stdout.as_fd(),
            to_fabric.as_fd(),
            from_fabric.as_fd(),
        )
        .unwrap_err();
    assert!(matches!(err, FabricError::IoFault { target: "stdout", .. }));

    drop(to_fabric);
    echo.join().unwrap();
}
