//! Output forwarding.
//!
//! The engine writes through [`Printer`] handles; every printer of a
//! bridge shares one [`OutputForwarder`], which passes each call straight
//! to the host's [`OutputSink`] in the order received. Nothing is
//! buffered or reordered here.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

/// One unit of program output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum OutputEvent {
    /// Text with no implied line break
    Text(String),
    /// Text followed by a line break
    Line(String),
    /// A bare line break
    Newline,
}

impl OutputEvent {
    /// The literal text this event adds to a console.
    pub fn render(&self) -> String {
        match self {
            OutputEvent::Text(text) => text.clone(),
            OutputEvent::Line(text) => format!("{}\n", text),
            OutputEvent::Newline => "\n".to_string(),
        }
    }
}

/// The host's rendering surface.
///
/// Implementations must return promptly; they are called synchronously
/// from the worker thread in program order.
pub trait OutputSink: Send + Sync {
    /// Append text without a line break.
    fn print(&self, text: &str);

    /// Append text followed by a line break.
    fn println(&self, text: &str);

    /// Emit a bare line break.
    fn newline(&self);
}

/// Which engine stream a printer was handed out for.
///
/// Both streams reach the same sink; the tag only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Out,
    Err,
}

/// Pass-through from engine output to the host sink.
#[derive(Clone)]
pub struct OutputForwarder {
    sink: Arc<dyn OutputSink>,
}

impl OutputForwarder {
    pub fn new(sink: impl OutputSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn from_arc(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }

    pub fn print(&self, text: &str) {
        self.sink.print(text);
    }

    pub fn println(&self, text: &str) {
        self.sink.println(text);
    }

    pub fn newline(&self) {
        self.sink.newline();
    }

    /// Forward an already-built event.
    pub fn emit(&self, event: &OutputEvent) {
        match event {
            OutputEvent::Text(text) => self.print(text),
            OutputEvent::Line(text) => self.println(text),
            OutputEvent::Newline => self.newline(),
        }
    }

    /// A printer tagged with `stream` that writes through this forwarder.
    pub fn printer(&self, stream: Stream) -> Printer {
        Printer {
            forwarder: self.clone(),
            stream,
        }
    }
}

impl std::fmt::Debug for OutputForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputForwarder").finish_non_exhaustive()
    }
}

/// Output handle given to an engine.
#[derive(Clone, Debug)]
pub struct Printer {
    forwarder: OutputForwarder,
    stream: Stream,
}

impl Printer {
    pub fn print(&self, text: &str) {
        log::trace!("[{:?}] print {:?}", self.stream, text);
        self.forwarder.print(text);
    }

    pub fn println(&self, text: &str) {
        log::trace!("[{:?}] println {:?}", self.stream, text);
        self.forwarder.println(text);
    }

    pub fn newline(&self) {
        log::trace!("[{:?}] newline", self.stream);
        self.forwarder.newline();
    }

    pub fn stream(&self) -> Stream {
        self.stream
    }
}

/// Sink that posts [`OutputEvent`]s to a channel.
///
/// Lets a host that must never block drain output from its own event
/// loop with `try_recv`.
pub struct ChannelSink {
    tx: Sender<OutputEvent>,
}

impl ChannelSink {
    /// Create the sink and the receiver the host drains.
    pub fn new() -> (Self, Receiver<OutputEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn post(&self, event: OutputEvent) {
        // A host that dropped its receiver no longer renders anything.
        let _ = self.tx.send(event);
    }
}

impl OutputSink for ChannelSink {
    fn print(&self, text: &str) {
        self.post(OutputEvent::Text(text.to_string()));
    }

    fn println(&self, text: &str) {
        self.post(OutputEvent::Line(text.to_string()));
    }

    fn newline(&self) {
        self.post(OutputEvent::Newline);
    }
}

/// Sink that accumulates rendered text in memory.
///
/// Clones share the same transcript.
#[derive(Clone, Default)]
pub struct CaptureSink {
    buffer: Arc<Mutex<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return and reset the transcript.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn append(&self, text: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }
}

impl OutputSink for CaptureSink {
    fn print(&self, text: &str) {
        self.append(text);
    }

    fn println(&self, text: &str) {
        self.append(text);
        self.append("\n");
    }

    fn newline(&self) {
        self.append("\n");
    }
}

/// Sink over any writer, flushed after every call.
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_all(&self, text: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.write_all(text.as_bytes()).and_then(|_| writer.flush()) {
            log::warn!("failed to write program output: {}", e);
        }
    }
}

impl<W: Write + Send> OutputSink for WriterSink<W> {
    fn print(&self, text: &str) {
        self.write_all(text);
    }

    fn println(&self, text: &str) {
        self.write_all(&format!("{}\n", text));
    }

    fn newline(&self) {
        self.write_all("\n");
    }
}
