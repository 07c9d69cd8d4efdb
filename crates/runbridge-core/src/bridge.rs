//! Host boundary.
//!
//! A [`Bridge`] is what the host holds. The two core operations,
//! [`submit_input_line`](Bridge::submit_input_line) and
//! [`run_program`](Bridge::run_program), never report failure to the
//! caller and never wait for a program: everything a run does is
//! observed through the output sink.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::config::BridgeConfig;
use crate::controller::session::{RunHandle, SessionEventEnvelope};
use crate::controller::ExecutionController;
use crate::engine::EngineFactory;
use crate::error::Result;
use crate::input::{InputChannel, WriteOutcome};
use crate::output::{OutputForwarder, OutputSink};

/// One input channel, one output forwarder and the controller for runs
/// that use them.
pub struct Bridge {
    input: InputChannel,
    output: OutputForwarder,
    controller: ExecutionController,
    config: BridgeConfig,
}

impl Bridge {
    /// Create a bridge with default configuration.
    pub fn new(factory: impl EngineFactory + 'static, sink: impl OutputSink + 'static) -> Self {
        Self::with_config(factory, sink, BridgeConfig::default())
    }

    /// Create a bridge with explicit configuration.
    pub fn with_config(
        factory: impl EngineFactory + 'static,
        sink: impl OutputSink + 'static,
        config: BridgeConfig,
    ) -> Self {
        Self::from_parts(
            Arc::new(factory),
            OutputForwarder::new(sink),
            config,
        )
    }

    /// Create a bridge from an already shared factory and forwarder.
    pub fn from_parts(
        factory: Arc<dyn EngineFactory>,
        output: OutputForwarder,
        config: BridgeConfig,
    ) -> Self {
        let input = InputChannel::with_capacity(config.input.capacity, config.input.when_full);
        let controller = ExecutionController::new(
            factory,
            input.clone(),
            output.clone(),
            config.run.clone(),
        );
        log::debug!(
            "Bridge created (capacity {}, pause {:?}, overlap {:?})",
            input.capacity(),
            config.run.pause,
            config.run.overlap
        );
        Self {
            input,
            output,
            controller,
            config,
        }
    }

    /// Queue one line of input for the current or next run.
    ///
    /// Safe to call at any time. With the default configuration this
    /// blocks while the channel is full.
    pub fn submit_input_line(&self, line: impl Into<String>) {
        if self.input.write(line) == WriteOutcome::Dropped {
            log::debug!("submitted input line was dropped");
        }
    }

    /// Queue one line of input, failing instead of blocking when full.
    pub fn try_submit_input_line(&self, line: impl Into<String>) -> Result<()> {
        self.input.try_write(line)
    }

    /// Start running `code` and return immediately.
    pub fn run_program(&self, code: impl Into<String>) {
        if let Err(e) = self.start_run(code) {
            log::error!("Failed to start program: {}", e);
        }
    }

    /// Start running `code`, returning a handle to the run.
    pub fn start_run(&self, code: impl Into<String>) -> Result<RunHandle> {
        self.controller.start(code.into())
    }

    /// Resume every paused run. Only meaningful with the `host` pause policy.
    pub fn resume(&self) -> Result<usize> {
        self.controller.resume()
    }

    /// Cancel every run in flight.
    pub fn stop(&self) -> Result<usize> {
        self.controller.stop()
    }

    /// Check if a run is waiting at a pause checkpoint.
    pub fn is_paused(&self) -> bool {
        self.controller.is_paused()
    }

    /// Handles to every run still in flight.
    pub fn active_runs(&self) -> Vec<RunHandle> {
        self.controller.active()
    }

    /// Block until every run started so far has finished.
    pub fn wait_idle(&self) {
        self.controller.wait_idle();
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> Receiver<SessionEventEnvelope> {
        self.controller.subscribe()
    }

    /// The input channel.
    pub fn input(&self) -> &InputChannel {
        &self.input
    }

    /// The output forwarder.
    pub fn output(&self) -> &OutputForwarder {
        &self.output
    }

    /// The configuration the bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("input", &self.input)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
