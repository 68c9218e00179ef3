//! Request/response correlation
//!
//! The board answers asynchronously, so a foreground caller blocks on a
//! completion signal that the reader thread fires when it sees the
//! terminating line of the current command. Every call arms a fresh one-shot
//! channel; a completion that arrives after the deadline therefore dies with
//! its own channel and can never satisfy a later command. Only one command
//! may be outstanding at a time, a second caller is rejected instead of
//! queued.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::protocol::{ProtocolError, RangingLink};

/// How a correlated call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallOutcome {
    /// The reader saw the completion line within the deadline
    Completed,
    /// The deadline passed; the slot has been disarmed
    TimedOut,
}

#[derive(Debug, Default)]
pub(crate) struct Correlator {
    slot: Mutex<Option<SyncSender<()>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `bytes` to the board and waits for the completion line.
    pub fn call(
        &self,
        link: &mut dyn RangingLink,
        bytes: &[u8],
        deadline: Duration,
    ) -> Result<CallOutcome, ProtocolError> {
        let rx = self.arm()?;
        if let Err(e) = link.write_all(bytes).and_then(|_| link.flush()) {
            self.disarm();
            return Err(e.into());
        }
        match rx.recv_timeout(deadline) {
            Ok(()) => Ok(CallOutcome::Completed),
            Err(RecvTimeoutError::Timeout) => {
                self.disarm();
                Ok(CallOutcome::TimedOut)
            }
            // The sender only disappears when the handle is torn down, at
            // which point nothing will ever complete this command.
            Err(RecvTimeoutError::Disconnected) => {
                self.disarm();
                Ok(CallOutcome::TimedOut)
            }
        }
    }

    /// Reader side: fires the outstanding completion, if any.
    ///
    /// A completion line with no command waiting (boot chatter, a command
    /// that already timed out) is a no-op.
    pub fn complete(&self) {
        if let Some(tx) = self.lock_slot().take() {
            let _ = tx.send(());
        }
    }

    fn arm(&self) -> Result<Receiver<()>, ProtocolError> {
        let mut slot = self.lock_slot();
        if slot.is_some() {
            return Err(ProtocolError::CommandInFlight);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        *slot = Some(tx);
        Ok(rx)
    }

    fn disarm(&self) {
        self.lock_slot().take();
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<SyncSender<()>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
