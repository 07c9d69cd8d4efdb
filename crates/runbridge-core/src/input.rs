//! Bounded input channel.
//!
//! Lines submitted by the host are queued here and consumed, one per
//! read, by the engine running on a worker thread. The channel is a
//! bounded crossbeam queue:
//!
//! - FIFO delivery, each line observed by exactly one read
//! - a full channel blocks the producer (or drops the line, per [`FullPolicy`])
//! - an empty channel blocks the consumer
//! - [`InputChannel::clear`] discards everything buffered so a new run
//!   never sees input typed for an earlier one

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::engine::InputSource;
use crate::error::{Error, Result};

/// Default number of outstanding lines the channel holds.
pub const DEFAULT_CAPACITY: usize = 100;

/// What a producer does when the channel is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullPolicy {
    /// Block the producer until the consumer makes room
    Block,
    /// Discard the line and return immediately
    Drop,
}

impl Default for FullPolicy {
    fn default() -> Self {
        Self::Block
    }
}

/// Result of a cancellable read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A line was taken from the head of the channel
    Line(String),
    /// The wait was cancelled before a line arrived
    Cancelled,
}

impl ReadOutcome {
    /// Collapse to the engine-facing contract: a cancelled read is an empty line.
    pub fn into_line(self) -> String {
        match self {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Cancelled => String::new(),
        }
    }
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The line is in the channel
    Queued,
    /// The channel was full and the policy is [`FullPolicy::Drop`]
    Dropped,
    /// The producer's wait for space was cancelled; the line was abandoned
    Cancelled,
}

/// Bounded FIFO of input lines shared by the host (producer) and the
/// current run's engine (consumer).
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct InputChannel {
    tx: Sender<String>,
    rx: Receiver<String>,
    capacity: usize,
    when_full: FullPolicy,
}

impl Default for InputChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InputChannel {
    /// Create a channel with [`DEFAULT_CAPACITY`] that blocks when full.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, FullPolicy::Block)
    }

    /// Create a channel with an explicit capacity and full-channel policy.
    ///
    /// A capacity of zero is raised to one; a zero-capacity crossbeam
    /// channel is a rendezvous point, not a buffer.
    pub fn with_capacity(capacity: usize, when_full: FullPolicy) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            when_full,
        }
    }

    /// Append a line, applying the channel's [`FullPolicy`].
    ///
    /// With [`FullPolicy::Block`] the calling thread waits for space.
    pub fn write(&self, line: impl Into<String>) -> WriteOutcome {
        self.deliver(line.into(), None)
    }

    /// Like [`write`](Self::write), but a blocked producer gives up when
    /// `cancel` fires. The abandoned line is discarded.
    pub fn write_until(&self, line: impl Into<String>, cancel: &CancelToken) -> WriteOutcome {
        self.deliver(line.into(), Some(cancel))
    }

    /// Append a line without ever blocking.
    pub fn try_write(&self, line: impl Into<String>) -> Result<()> {
        match self.tx.try_send(line.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                Err(Error::InputFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    fn deliver(&self, line: String, cancel: Option<&CancelToken>) -> WriteOutcome {
        match self.when_full {
            FullPolicy::Drop => match self.tx.try_send(line) {
                Ok(()) => WriteOutcome::Queued,
                Err(TrySendError::Full(dropped)) | Err(TrySendError::Disconnected(dropped)) => {
                    log::warn!(
                        "input channel full ({} lines), dropping {} byte line",
                        self.capacity,
                        dropped.len()
                    );
                    WriteOutcome::Dropped
                }
            },
            FullPolicy::Block => match cancel {
                None => match self.tx.send(line) {
                    Ok(()) => WriteOutcome::Queued,
                    Err(_) => WriteOutcome::Dropped,
                },
                Some(token) => {
                    if token.is_cancelled() {
                        log::debug!("input write abandoned: already cancelled");
                        return WriteOutcome::Cancelled;
                    }
                    select! {
                        send(self.tx, line) -> res => match res {
                            Ok(()) => WriteOutcome::Queued,
                            Err(_) => WriteOutcome::Dropped,
                        },
                        recv(token.signal()) -> _ => {
                            log::debug!("input write abandoned: cancelled while waiting for space");
                            WriteOutcome::Cancelled
                        }
                    }
                }
            },
        }
    }

    /// Take the head line, blocking until one is available.
    ///
    /// With no cancellation source this waits indefinitely.
    pub fn read_line(&self) -> String {
        // Both ends live in `self`, so the channel can never disconnect.
        self.rx.recv().unwrap_or_default()
    }

    /// Take the head line, or give up when `cancel` fires.
    pub fn read_line_until(&self, cancel: &CancelToken) -> ReadOutcome {
        if cancel.is_cancelled() {
            return ReadOutcome::Cancelled;
        }
        select! {
            recv(self.rx) -> line => match line {
                Ok(line) => ReadOutcome::Line(line),
                Err(_) => ReadOutcome::Cancelled,
            },
            recv(cancel.signal()) -> _ => ReadOutcome::Cancelled,
        }
    }

    /// Take the head line if one is buffered.
    pub fn try_read_line(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Discard every buffered line, returning how many were dropped.
    ///
    /// Each discarded line is removed through the same queue operation a
    /// reader uses, so a concurrent reader sees any given line either
    /// never or exactly once.
    pub fn clear(&self) -> usize {
        let discarded = self.rx.try_iter().count();
        if discarded > 0 {
            log::debug!("cleared {} stale input line(s)", discarded);
        }
        discarded
    }

    /// Number of buffered lines.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of buffered lines.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The full-channel policy.
    pub fn when_full(&self) -> FullPolicy {
        self.when_full
    }
}

impl InputSource for InputChannel {
    fn read_line(&self) -> String {
        InputChannel::read_line(self)
    }
}

impl std::fmt::Debug for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("when_full", &self.when_full)
            .finish()
    }
}

/// The input source handed to one run's engine.
///
/// Reads block on the shared channel but end early, as an empty line,
/// once the run is cancelled.
#[derive(Clone, Debug)]
pub struct SessionInput {
    channel: InputChannel,
    cancel: CancelToken,
}

impl SessionInput {
    pub fn new(channel: InputChannel, cancel: CancelToken) -> Self {
        Self { channel, cancel }
    }

    /// Read with the cancelled case kept distinct.
    pub fn read_outcome(&self) -> ReadOutcome {
        self.channel.read_line_until(&self.cancel)
    }
}

impl InputSource for SessionInput {
    fn read_line(&self) -> String {
        match self.read_outcome() {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Cancelled => {
                log::debug!("input read cancelled, returning empty line");
                String::new()
            }
        }
    }
}
