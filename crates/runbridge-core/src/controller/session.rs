//! Run sessions: outcomes, reports, lifecycle events and handles.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::engine::PauseGate;

/// Identifier of one run, unique per bridge.
pub type SessionId = u64;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Analysis rejected the program; nothing was executed
    AnalysisFailed,
    /// Execution ran to the end
    Completed,
    /// Execution ended after the engine reported a runtime error
    RuntimeError,
    /// The run was cancelled (superseded, stopped or interrupted)
    Cancelled,
    /// The engine panicked on the worker thread
    Panicked,
}

impl RunOutcome {
    /// True for the outcomes that should make a console host exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunOutcome::AnalysisFailed | RunOutcome::RuntimeError | RunOutcome::Panicked
        )
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub session: SessionId,
    pub outcome: RunOutcome,
    /// Pause checkpoints the engine reached
    pub pauses: u32,
    /// Pause waits that ended by resuming
    pub resumes: u32,
    /// Input lines the program consumed
    pub reads: u32,
}

/// Lifecycle signals observed by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Spawned,
    AnalysisFinished { success: bool },
    ExecutionStarted,
    ExecutionPaused { line: Option<u32>, was_print: bool },
    Resumed,
    ExecutionStopped,
    StackPushed { depth: usize, name: String },
    StackPopped { depth: usize },
    ReadExecuted { line: u32 },
    RuntimeError,
    Finished { outcome: RunOutcome },
}

/// A [`SessionEvent`] tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEventEnvelope {
    pub session: SessionId,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Fan-out of session events to every live subscriber.
#[derive(Clone, Default)]
pub(crate) struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<SessionEventEnvelope>>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<SessionEventEnvelope> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub(crate) fn publish(&self, session: SessionId, event: SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.is_empty() {
            return;
        }
        let envelope = SessionEventEnvelope { session, event };
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
    }
}

/// Counters updated by the controller's listener on the worker thread.
#[derive(Default)]
pub(crate) struct SessionStats {
    pub(crate) pauses: AtomicU32,
    pub(crate) reads: AtomicU32,
    pub(crate) runtime_error: AtomicBool,
}

/// State shared between a run's worker, its handles and the controller.
pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) cancel: CancelToken,
    pub(crate) gate: PauseGate,
    pub(crate) stats: SessionStats,
    report: Mutex<Option<RunReport>>,
    finished: Condvar,
}

impl SessionShared {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            cancel: CancelToken::new(),
            gate: PauseGate::new(),
            stats: SessionStats::default(),
            report: Mutex::new(None),
            finished: Condvar::new(),
        }
    }

    /// Cancel the run: reads and writes stop waiting, pauses abort.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
        self.gate.abort();
    }

    /// Record the final report and wake every joiner.
    pub(crate) fn finish(&self, outcome: RunOutcome) -> RunReport {
        let report = RunReport {
            session: self.id,
            outcome,
            pauses: self.stats.pauses.load(Ordering::SeqCst),
            resumes: self.gate.resumed_count(),
            reads: self.stats.reads.load(Ordering::SeqCst),
        };
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        self.finished.notify_all();
        report
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn wait(&self) -> RunReport {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(report) = report.as_ref() {
                return report.clone();
            }
            report = self
                .finished
                .wait(report)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<RunReport> {
        let deadline = Instant::now() + timeout;
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(report) = report.as_ref() {
                return Some(report.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            report = self
                .finished
                .wait_timeout(report, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Handle to one started run.
///
/// Dropping the handle detaches the run; it keeps going on its worker.
#[derive(Clone)]
pub struct RunHandle {
    shared: Arc<SessionShared>,
}

impl RunHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// The run's session id.
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Cancel the run. Blocked input reads return, pause waits abort and
    /// the engine is asked to stop evaluating.
    pub fn cancel(&self) {
        log::info!("Cancelling session {}", self.shared.id);
        self.shared.cancel();
    }

    /// Continue a run waiting at a pause checkpoint.
    pub fn resume(&self) {
        self.shared.gate.resume();
    }

    /// Check if the run is waiting at a pause checkpoint.
    pub fn is_paused(&self) -> bool {
        self.shared.gate.is_waiting()
    }

    /// Check if the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Block until the run finishes.
    pub fn join(&self) -> RunReport {
        self.shared.wait()
    }

    /// Block until the run finishes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RunReport> {
        self.shared.wait_timeout(timeout)
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.shared.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
