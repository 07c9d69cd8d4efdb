//! The controller's engine listener.
//!
//! Every signal is fire-and-forget: it is logged, counted where the run
//! report needs it, and published to subscribers. The one signal with a
//! side effect is a pause under [`PausePolicy::AutoResume`], which is
//! resumed before the callback returns.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::PausePolicy;
use crate::engine::{EngineListener, PauseGate, ScopeInfo};

use super::session::{EventHub, SessionEvent, SessionShared};

pub(crate) struct ControllerListener {
    session: Arc<SessionShared>,
    pause: PausePolicy,
    events: EventHub,
    depth: usize,
}

impl ControllerListener {
    pub(crate) fn new(session: Arc<SessionShared>, pause: PausePolicy, events: EventHub) -> Self {
        Self {
            session,
            pause,
            events,
            depth: 0,
        }
    }

    fn publish(&self, event: SessionEvent) {
        self.events.publish(self.session.id, event);
    }
}

impl EngineListener for ControllerListener {
    fn analysis_finished(&mut self, success: bool) {
        log::debug!(
            "[session {}] analysis finished (success: {})",
            self.session.id,
            success
        );
        self.publish(SessionEvent::AnalysisFinished { success });
    }

    fn execution_started(&mut self) {
        log::debug!("[session {}] execution started", self.session.id);
        self.publish(SessionEvent::ExecutionStarted);
    }

    fn execution_paused(&mut self, gate: &PauseGate, line: Option<u32>, was_print: bool) {
        self.session.stats.pauses.fetch_add(1, Ordering::SeqCst);
        self.publish(SessionEvent::ExecutionPaused { line, was_print });

        match self.pause {
            PausePolicy::AutoResume => {
                log::trace!(
                    "[session {}] paused at {:?}, resuming",
                    self.session.id,
                    line
                );
                gate.resume();
                self.publish(SessionEvent::Resumed);
            }
            PausePolicy::Host => {
                log::info!(
                    "[session {}] paused at line {}, waiting for host",
                    self.session.id,
                    line.map(|l| l.to_string()).unwrap_or_else(|| "?".to_string())
                );
            }
        }
    }

    fn execution_stopped(&mut self) {
        log::debug!("[session {}] execution stopped", self.session.id);
        self.publish(SessionEvent::ExecutionStopped);
    }

    fn stack_pushed(&mut self, scope: &ScopeInfo) {
        self.depth = scope.depth;
        self.publish(SessionEvent::StackPushed {
            depth: scope.depth,
            name: scope.name.clone(),
        });
    }

    fn stack_popped(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.publish(SessionEvent::StackPopped { depth: self.depth });
    }

    fn read_statement_executed(&mut self, line: u32) {
        self.session.stats.reads.fetch_add(1, Ordering::SeqCst);
        self.publish(SessionEvent::ReadExecuted { line });
    }

    fn runtime_error(&mut self) {
        // The engine has already written the description to the output.
        log::debug!("[session {}] runtime error reported", self.session.id);
        self.session.stats.runtime_error.store(true, Ordering::SeqCst);
        self.publish(SessionEvent::RuntimeError);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GateOutcome;

    fn listener(pause: PausePolicy) -> (ControllerListener, Arc<SessionShared>, EventHub) {
        let session = Arc::new(SessionShared::new(1));
        let events = EventHub::default();
        (
            ControllerListener::new(session.clone(), pause, events.clone()),
            session,
            events,
        )
    }

    #[test]
    fn test_auto_resume_releases_the_next_wait() {
        let (mut listener, session, _) = listener(PausePolicy::AutoResume);
        for _ in 0..3 {
            listener.execution_paused(&session.gate, Some(4), false);
            assert_eq!(session.gate.wait(), GateOutcome::Resumed);
        }
        assert_eq!(session.stats.pauses.load(Ordering::SeqCst), 3);
        assert_eq!(session.gate.resumed_count(), 3);
    }

    #[test]
    fn test_host_policy_leaves_gate_closed() {
        let (mut listener, session, events) = listener(PausePolicy::Host);
        let rx = events.subscribe();
        listener.execution_paused(&session.gate, None, true);

        let events: Vec<_> = rx.try_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![SessionEvent::ExecutionPaused {
                line: None,
                was_print: true
            }]
        );
        session.gate.abort();
        assert_eq!(session.gate.wait(), GateOutcome::Aborted);
    }

    #[test]
    fn test_stack_depth_tracking() {
        let (mut listener, _, events) = listener(PausePolicy::AutoResume);
        let rx = events.subscribe();
        listener.stack_pushed(&ScopeInfo {
            depth: 1,
            name: "global".to_string(),
            variables: Vec::new(),
        });
        listener.stack_popped();

        let events: Vec<_> = rx.try_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::StackPushed {
                    depth: 1,
                    name: "global".to_string()
                },
                SessionEvent::StackPopped { depth: 0 },
            ]
        );
    }

    #[test]
    fn test_reads_and_runtime_errors_are_recorded() {
        let (mut listener, session, _) = listener(PausePolicy::AutoResume);
        listener.read_statement_executed(2);
        listener.read_statement_executed(5);
        listener.runtime_error();
        assert_eq!(session.stats.reads.load(Ordering::SeqCst), 2);
        assert!(session.stats.runtime_error.load(Ordering::SeqCst));
    }
}
