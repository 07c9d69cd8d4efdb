//! Execution controller.
//!
//! Turns one "run this program" request into a run on a dedicated worker
//! thread and returns at once. On the worker:
//!
//! 1. a fresh engine is built, wired to the shared output forwarder (all
//!    four printers) and to the input channel
//! 2. the controller's listener is registered
//! 3. the engine analyses the program; on failure the run ends there
//! 4. the engine executes the program, blocking only the worker
//!
//! # Architecture
//!
//! ```text
//! ExecutionController
//! ├── InputChannel    (shared, cleared before each run)
//! ├── OutputForwarder (shared, all engine printers)
//! └── sessions
//!     └── SessionShared (cancel token + pause gate + counters + report)
//!           └── worker thread
//!                 └── Engine ── ControllerListener
//! ```

mod listener;
pub mod session;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::Receiver;

use crate::config::{OverlapPolicy, RunSettings};
use crate::engine::{EngineFactory, EngineIo};
use crate::error::{Error, Result};
use crate::input::{InputChannel, SessionInput};
use crate::output::{OutputForwarder, Stream};

use listener::ControllerListener;
use session::{EventHub, RunHandle, RunOutcome, SessionEvent, SessionEventEnvelope, SessionShared};

/// Owns the lifecycle of every run started through one bridge.
pub struct ExecutionController {
    factory: Arc<dyn EngineFactory>,
    input: InputChannel,
    output: OutputForwarder,
    settings: RunSettings,
    next_id: AtomicU64,
    sessions: Mutex<Vec<Arc<SessionShared>>>,
    events: EventHub,
}

impl ExecutionController {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        input: InputChannel,
        output: OutputForwarder,
        settings: RunSettings,
    ) -> Self {
        Self {
            factory,
            input,
            output,
            settings,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(Vec::new()),
            events: EventHub::default(),
        }
    }

    /// Start a run of `source` and return without waiting for it.
    pub fn start(&self, source: String) -> Result<RunHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let earlier = self.in_flight();

        let mut wait_for = Vec::new();
        match self.settings.overlap {
            OverlapPolicy::Interleave => {
                if !earlier.is_empty() {
                    log::warn!(
                        "session {} starts while {} earlier run(s) are still going; output will interleave",
                        id,
                        earlier.len()
                    );
                }
                self.input.clear();
            }
            OverlapPolicy::Supersede => {
                for session in &earlier {
                    log::info!("session {} supersedes session {}", id, session.id);
                    session.cancel();
                }
                self.input.clear();
            }
            OverlapPolicy::Queue => {
                // The clear happens on the worker, once the earlier runs are done
                // with their input.
                wait_for = earlier;
            }
        }

        let shared = Arc::new(SessionShared::new(id));
        let worker = Worker {
            session: shared.clone(),
            source,
            factory: self.factory.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            settings: self.settings.clone(),
            events: self.events.clone(),
            wait_for,
        };

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.settings.thread_name, id));
        if let Some(stack_size) = self.settings.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder.spawn(move || worker.run()).map_err(Error::Spawn)?;

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(shared.clone());
        log::info!("Started session {}", id);

        Ok(RunHandle::new(shared))
    }

    /// Runs that have not finished yet, oldest first. Finished runs are forgotten.
    fn in_flight(&self) -> Vec<Arc<SessionShared>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|s| !s.is_finished());
        sessions.clone()
    }

    /// Handles to every run still in flight.
    pub fn active(&self) -> Vec<RunHandle> {
        self.in_flight().into_iter().map(RunHandle::new).collect()
    }

    /// Resume every run waiting at a pause checkpoint.
    pub fn resume(&self) -> Result<usize> {
        let paused: Vec<_> = self
            .in_flight()
            .into_iter()
            .filter(|s| s.gate.is_waiting())
            .collect();
        if paused.is_empty() {
            return Err(Error::NotPaused);
        }
        for session in &paused {
            session.gate.resume();
            self.events.publish(session.id, SessionEvent::Resumed);
        }
        Ok(paused.len())
    }

    /// Cancel every run in flight.
    pub fn stop(&self) -> Result<usize> {
        let running = self.in_flight();
        if running.is_empty() {
            return Err(Error::NoActiveRun);
        }
        for session in &running {
            log::info!("Stopping session {}", session.id);
            session.cancel();
        }
        Ok(running.len())
    }

    /// Check if any run in flight is waiting at a pause checkpoint.
    pub fn is_paused(&self) -> bool {
        self.in_flight().iter().any(|s| s.gate.is_waiting())
    }

    /// Block until every run started so far has finished.
    pub fn wait_idle(&self) {
        for session in self.in_flight() {
            session.wait();
        }
    }

    /// Subscribe to lifecycle events of all later runs.
    pub fn subscribe(&self) -> Receiver<SessionEventEnvelope> {
        self.events.subscribe()
    }
}

/// Everything one worker thread needs, moved onto it.
struct Worker {
    session: Arc<SessionShared>,
    source: String,
    factory: Arc<dyn EngineFactory>,
    input: InputChannel,
    output: OutputForwarder,
    settings: RunSettings,
    events: EventHub,
    wait_for: Vec<Arc<SessionShared>>,
}

impl Worker {
    fn run(self) {
        let id = self.session.id;
        self.events.publish(id, SessionEvent::Spawned);
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.drive())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("[session {}] engine panicked: {}", id, message);
                RunOutcome::Panicked
            }
        };

        // Subscribers see Finished before any joiner wakes up.
        self.events.publish(id, SessionEvent::Finished { outcome });
        let report = self.session.finish(outcome);
        log::info!(
            "Session {} finished: {:?} ({} pauses, {} resumes, {} reads)",
            id,
            report.outcome,
            report.pauses,
            report.resumes,
            report.reads
        );
    }

    fn drive(&self) -> RunOutcome {
        let id = self.session.id;

        if !self.wait_for.is_empty() {
            log::debug!(
                "[session {}] queued behind {} earlier run(s)",
                id,
                self.wait_for.len()
            );
            for earlier in &self.wait_for {
                earlier.wait();
            }
            self.input.clear();
        }

        let cancel = self.session.cancel.clone();
        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let io = EngineIo {
            stdout: self.output.printer(Stream::Out),
            stderr: self.output.printer(Stream::Err),
            interactive_out: self.output.printer(Stream::Out),
            interactive_err: self.output.printer(Stream::Err),
            input: SessionInput::new(self.input.clone(), cancel.clone()),
            gate: self.session.gate.clone(),
            cancel: cancel.clone(),
        };
        let mut engine = self.factory.create(&self.source, io);
        engine.add_listener(Box::new(ControllerListener::new(
            self.session.clone(),
            self.settings.pause,
            self.events.clone(),
        )));

        if !engine.analyze(self.settings.debug) {
            log::debug!("[session {}] analysis failed, not executing", id);
            return RunOutcome::AnalysisFailed;
        }
        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        engine.execute(self.settings.debug);

        if cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else if self.session.stats.runtime_error.load(Ordering::SeqCst) {
            RunOutcome::RuntimeError
        } else {
            RunOutcome::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PausePolicy;
    use crate::output::CaptureSink;
    use crate::testing::ScriptedEngine;
    use std::time::Duration;

    fn controller(settings: RunSettings) -> (ExecutionController, InputChannel, CaptureSink) {
        let input = InputChannel::new();
        let sink = CaptureSink::new();
        let controller = ExecutionController::new(
            Arc::new(ScriptedEngine::factory),
            input.clone(),
            OutputForwarder::new(sink.clone()),
            settings,
        );
        (controller, input, sink)
    }

    #[test]
    fn test_session_ids_increase() {
        let (controller, _, _) = controller(RunSettings::default());
        let first = controller.start("println a".to_string()).unwrap();
        let second = controller.start("println b".to_string()).unwrap();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        controller.wait_idle();
    }

    #[test]
    fn test_worker_thread_is_named() {
        let settings = RunSettings {
            thread_name: "custom".to_string(),
            ..RunSettings::default()
        };
        let (controller, _, sink) = controller(settings);
        controller.start("thread-name".to_string()).unwrap().join();
        assert_eq!(sink.contents(), "custom-1\n");
    }

    #[test]
    fn test_panicking_engine_reports_panicked() {
        let (controller, _, _) = controller(RunSettings::default());
        let report = controller.start("panic".to_string()).unwrap().join();
        assert_eq!(report.outcome, RunOutcome::Panicked);
    }

    #[test]
    fn test_queue_waits_for_earlier_run() {
        let settings = RunSettings {
            overlap: OverlapPolicy::Queue,
            ..RunSettings::default()
        };
        let (controller, input, sink) = controller(settings);

        let first = controller.start("read first: ".to_string()).unwrap();
        let second = controller.start("println second".to_string()).unwrap();
        assert!(second.wait_timeout(Duration::from_millis(50)).is_none());

        input.write("x");
        assert_eq!(first.join().outcome, RunOutcome::Completed);
        assert_eq!(second.join().outcome, RunOutcome::Completed);
        assert_eq!(sink.contents(), "first: x\nsecond\n");
    }

    #[test]
    fn test_supersede_cancels_earlier_run() {
        let settings = RunSettings {
            overlap: OverlapPolicy::Supersede,
            ..RunSettings::default()
        };
        let (controller, input, sink) = controller(settings);

        let first = controller.start("read never: ".to_string()).unwrap();
        let second = controller.start("read got: ".to_string()).unwrap();

        assert_eq!(first.join().outcome, RunOutcome::Cancelled);
        input.write("line");
        assert_eq!(second.join().outcome, RunOutcome::Completed);
        assert_eq!(sink.contents(), "got: line\n");
    }

    #[test]
    fn test_host_pause_policy_waits_for_resume() {
        let settings = RunSettings {
            pause: PausePolicy::Host,
            ..RunSettings::default()
        };
        let (controller, _, sink) = controller(settings);
        assert!(matches!(controller.resume(), Err(Error::NotPaused)));

        let handle = controller.start("pause 3\nprintln after".to_string()).unwrap();
        for _ in 0..200 {
            if controller.is_paused() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(controller.is_paused());
        assert_eq!(sink.contents(), "");

        assert_eq!(controller.resume().unwrap(), 1);
        let report = handle.join();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!((report.pauses, report.resumes), (1, 1));
        assert_eq!(sink.contents(), "after\n");
    }

    #[test]
    fn test_stop_aborts_paused_run() {
        let settings = RunSettings {
            pause: PausePolicy::Host,
            ..RunSettings::default()
        };
        let (controller, _, sink) = controller(settings);
        assert!(matches!(controller.stop(), Err(Error::NoActiveRun)));

        let handle = controller.start("pause 1\nprintln unreachable".to_string()).unwrap();
        for _ in 0..200 {
            if handle.is_paused() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(controller.stop().unwrap(), 1);
        let report = handle.join();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.resumes, 0);
        assert_eq!(sink.contents(), "");
    }
}
