//! runbridge core - run a blocking program-execution engine behind a
//! host that must never block.
//!
//! The host submits input lines and starts runs; each run executes on
//! its own worker thread, reads input from a bounded channel and writes
//! output through a pass-through forwarder:
//!
//! - **Input** - [`InputChannel`], the bounded FIFO of submitted lines
//! - **Output** - [`OutputForwarder`] and the [`OutputSink`] the host implements
//! - **Engine** - the [`Engine`] / [`EngineListener`] boundary an interpreter implements
//! - **Controller** - [`ExecutionController`], one worker per run, pause handling
//! - **Bridge** - [`Bridge`], the host-facing surface
//!
//! # Usage
//!
//! ```no_run
//! use runbridge_core::{Bridge, CaptureSink, Engine, EngineIo};
//!
//! # fn make_engine(source: &str, io: EngineIo) -> Box<dyn Engine> { unimplemented!() }
//! let output = CaptureSink::new();
//! let bridge = Bridge::new(make_engine, output.clone());
//!
//! // Returns immediately; the program runs on its own thread.
//! bridge.run_program("name = read_line(); print(\"Hello, \" + name);");
//!
//! // Delivered whenever the host has it.
//! bridge.submit_input_line("World");
//! ```

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod global;
pub mod input;
pub mod output;

#[cfg(test)]
mod testing;

pub use bridge::Bridge;
pub use cancel::CancelToken;
pub use config::{
    BridgeConfig, InputSettings, OverlapPolicy, PausePolicy, RunSettings, DEFAULT_CONFIG_TOML,
};
pub use controller::session::{
    RunHandle, RunOutcome, RunReport, SessionEvent, SessionEventEnvelope, SessionId,
};
pub use controller::ExecutionController;
pub use engine::{
    Engine, EngineFactory, EngineIo, EngineListener, GateOutcome, InputSource, PauseGate,
    ScopeInfo,
};
pub use error::{Error, Result};
pub use input::{FullPolicy, InputChannel, ReadOutcome, SessionInput, WriteOutcome, DEFAULT_CAPACITY};
pub use output::{
    CaptureSink, ChannelSink, OutputEvent, OutputForwarder, OutputSink, Printer, Stream,
    WriterSink,
};
