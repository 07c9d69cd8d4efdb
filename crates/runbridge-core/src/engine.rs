//! The engine boundary.
//!
//! runbridge does not lex, parse or evaluate anything itself. An engine
//! implementation is constructed on the worker thread from a source text
//! and an [`EngineIo`] bundle, receives [`EngineListener`]s, and is then
//! driven through two phases: [`Engine::analyze`] and, if that succeeds,
//! [`Engine::execute`].
//!
//! # Pausing
//!
//! An engine yields at a checkpoint by notifying
//! [`EngineListener::execution_paused`] and then calling
//! [`PauseGate::wait`]. A listener (or the host) lets it continue with
//! [`PauseGate::resume`]. A resume issued from inside the callback is
//! remembered, so the wait that follows returns at once.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::input::SessionInput;
use crate::output::Printer;

/// Where an engine's input reads come from.
pub trait InputSource: Send + Sync {
    /// Block until a line is available and return it. An interrupted
    /// wait yields an empty string.
    fn read_line(&self) -> String;
}

/// Symbol-table context carried by scope entry notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    /// Nesting depth after the push (the global scope is 1).
    pub depth: usize,
    /// Name of the scope (`global`, a function name, ...).
    pub name: String,
    /// Names visible in the new scope at the time of the push.
    pub variables: Vec<String>,
}

/// Callbacks an engine raises during a run.
///
/// Every method defaults to a no-op; all are invoked on the worker thread.
#[allow(unused_variables)]
pub trait EngineListener: Send {
    /// Static analysis finished.
    fn analysis_finished(&mut self, success: bool) {}

    /// The evaluation phase began.
    fn execution_started(&mut self) {}

    /// The engine reached a checkpoint and will wait on `gate` once this returns.
    fn execution_paused(&mut self, gate: &PauseGate, line: Option<u32>, was_print: bool) {}

    /// The evaluation phase ended, for whatever reason.
    fn execution_stopped(&mut self) {}

    /// A scope was entered.
    fn stack_pushed(&mut self, scope: &ScopeInfo) {}

    /// A scope was left.
    fn stack_popped(&mut self) {}

    /// The program consumed one input line at `line`.
    fn read_statement_executed(&mut self, line: u32) {}

    /// A runtime error occurred. The engine has already written its
    /// description to the error printer.
    fn runtime_error(&mut self) {}
}

/// A program-execution engine for one run.
pub trait Engine {
    /// Register a listener. Must be called before [`analyze`](Self::analyze).
    fn add_listener(&mut self, listener: Box<dyn EngineListener>);

    /// Lex, parse and check the program. Diagnostics go to the error
    /// printer; the return value says whether execution may proceed.
    fn analyze(&mut self, debug: bool) -> bool;

    /// Evaluate the analysed program, blocking the calling thread until
    /// the program ends.
    fn execute(&mut self, debug: bool);

    /// Let a paused program continue.
    ///
    /// Host-side equivalent of [`PauseGate::resume`] on the gate in this
    /// engine's [`EngineIo`]. A resume issued before the program reaches a
    /// checkpoint releases that checkpoint when it is reached.
    fn resume(&self);
}

/// Builds one engine per run.
///
/// Called on the worker thread, so the engine itself need not be `Send`.
pub trait EngineFactory: Send + Sync {
    fn create(&self, source: &str, io: EngineIo) -> Box<dyn Engine>;
}

impl<F> EngineFactory for F
where
    F: Fn(&str, EngineIo) -> Box<dyn Engine> + Send + Sync,
{
    fn create(&self, source: &str, io: EngineIo) -> Box<dyn Engine> {
        self(source, io)
    }
}

/// Everything an engine is wired to for one run.
#[derive(Clone, Debug)]
pub struct EngineIo {
    /// Buffered standard output
    pub stdout: Printer,
    /// Buffered error output
    pub stderr: Printer,
    /// Interactive standard output
    pub interactive_out: Printer,
    /// Interactive error output
    pub interactive_err: Printer,
    /// Sole input source
    pub input: SessionInput,
    /// Suspension point for pause checkpoints
    pub gate: PauseGate,
    /// Fires when the run is cancelled; engines should stop evaluating
    pub cancel: CancelToken,
}

/// How a [`PauseGate::wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Resumed,
    Aborted,
}

#[derive(Default)]
struct GateState {
    resume_pending: bool,
    aborted: bool,
    waiting: bool,
    resumed: u32,
}

/// Suspension primitive for pause checkpoints.
#[derive(Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until resumed or aborted. Consumes one pending resume.
    pub fn wait(&self) -> GateOutcome {
        let (_, cvar) = &*self.inner;
        let mut state = self.state();
        state.waiting = true;
        loop {
            if state.aborted {
                state.waiting = false;
                return GateOutcome::Aborted;
            }
            if state.resume_pending {
                state.resume_pending = false;
                state.waiting = false;
                state.resumed += 1;
                return GateOutcome::Resumed;
            }
            state = cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Release the current (or next) wait.
    pub fn resume(&self) {
        self.state().resume_pending = true;
        self.inner.1.notify_all();
    }

    /// Release the current wait and every later one as aborted.
    pub fn abort(&self) {
        self.state().aborted = true;
        self.inner.1.notify_all();
    }

    /// Check if an engine is blocked in [`wait`](Self::wait).
    pub fn is_waiting(&self) -> bool {
        self.state().waiting
    }

    /// Check if [`abort`](Self::abort) was called.
    pub fn is_aborted(&self) -> bool {
        self.state().aborted
    }

    /// Number of waits that ended in [`GateOutcome::Resumed`].
    pub fn resumed_count(&self) -> u32 {
        self.state().resumed
    }
}

impl std::fmt::Debug for PauseGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("PauseGate")
            .field("waiting", &state.waiting)
            .field("aborted", &state.aborted)
            .field("resumed", &state.resumed)
            .finish()
    }
}
