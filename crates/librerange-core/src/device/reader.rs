//! Background reader loop
//!
//! One thread per device handle. It owns the receive half of the link and
//! the line assembler, feeds every completed line into the shared decoder
//! and fires the correlator when a line completes the outstanding command.
//! Faults never kill the loop: they are logged and answered with a fixed
//! backoff, then reading continues.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{trace, warn};

use super::correlator::Correlator;
use crate::protocol::{Decoder, LineAssembler, ProtocolError, RangingLink};

/// Pause after a fault before the loop resumes reading
const FAULT_BACKOFF: Duration = Duration::from_secs(2);

/// State shared between a device handle and its reader thread
#[derive(Debug)]
pub(crate) struct ReaderShared {
    decoder: Mutex<Decoder>,
    pub correlator: Correlator,
    pub stop: AtomicBool,
}

impl ReaderShared {
    pub fn new() -> Self {
        Self {
            decoder: Mutex::new(Decoder::new()),
            correlator: Correlator::new(),
            stop: AtomicBool::new(false),
        }
    }

    /// Locks the decoder, recovering from a poisoned lock so the reader
    /// outlives a panicking foreground thread.
    pub fn decoder(&self) -> MutexGuard<'_, Decoder> {
        self.decoder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Spawns the reader thread for `link`.
pub(crate) fn spawn(
    link: Box<dyn RangingLink>,
    shared: Arc<ReaderShared>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("librerange-reader".to_string())
        .spawn(move || reader_loop(link, shared))
}

fn reader_loop(mut link: Box<dyn RangingLink>, shared: Arc<ReaderShared>) {
    let mut assembler = LineAssembler::new();
    let mut dowait = true;
    while !shared.stop.load(Ordering::Relaxed) {
        match pump(link.as_mut(), &mut assembler, &shared, dowait) {
            Ok(had_line) => dowait = !had_line,
            Err(e) => {
                warn!(error = %e, "reader fault, backing off");
                std::thread::sleep(FAULT_BACKOFF);
            }
        }
    }
    trace!("reader loop stopped");
}

/// One iteration: read available bytes and decode at most one line.
///
/// Returns whether a line was extracted; when nothing was there the next
/// iteration does the brief blocking read again instead of spinning.
fn pump(
    link: &mut dyn RangingLink,
    assembler: &mut LineAssembler,
    shared: &ReaderShared,
    dowait: bool,
) -> Result<bool, ProtocolError> {
    if dowait {
        let mut byte = [0u8; 1];
        match link.read(&mut byte) {
            Ok(0) => {}
            Ok(_) => assembler.feed(&byte),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }
    }

    let pending = link.bytes_to_read()?;
    if pending > 0 {
        let mut chunk = vec![0u8; pending as usize];
        link.read_exact(&mut chunk)?;
        assembler.feed(&chunk);
    }

    let Some(line) = assembler.take_line() else {
        return Ok(false);
    };

    // A malformed line propagates as a fault after it has been consumed, so
    // the loop resumes with the next line once the backoff is over.
    let outcome = shared.decoder().feed_line(&line)?;
    trace!(%line, completed = outcome.completed, "board line");
    if outcome.completed {
        shared.correlator.complete();
    }
    Ok(true)
}
