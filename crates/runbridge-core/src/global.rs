//! Process-wide default bridge.
//!
//! Some hosts can only export free functions. They install one [`Bridge`]
//! at startup and then call [`submit_input_line`] and [`run_program`]
//! from their callbacks.

use once_cell::sync::OnceCell;

use crate::bridge::Bridge;
use crate::error::{Error, Result};

static DEFAULT_BRIDGE: OnceCell<Bridge> = OnceCell::new();

/// Install the default bridge. Fails if one is already installed.
pub fn install(bridge: Bridge) -> Result<&'static Bridge> {
    DEFAULT_BRIDGE
        .set(bridge)
        .map_err(|_| Error::AlreadyInstalled)?;
    get().ok_or(Error::NotInstalled)
}

/// The default bridge, if installed.
pub fn get() -> Option<&'static Bridge> {
    DEFAULT_BRIDGE.get()
}

/// The default bridge, or [`Error::NotInstalled`].
pub fn require() -> Result<&'static Bridge> {
    get().ok_or(Error::NotInstalled)
}

/// Queue one input line on the default bridge.
pub fn submit_input_line(line: &str) {
    match get() {
        Some(bridge) => bridge.submit_input_line(line),
        None => log::warn!("submit_input_line called before a bridge was installed"),
    }
}

/// Start a run on the default bridge.
pub fn run_program(code: &str) {
    match get() {
        Some(bridge) => bridge.run_program(code),
        None => log::warn!("run_program called before a bridge was installed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaptureSink;
    use crate::testing::ScriptedEngine;

    // The default bridge lives for the whole test binary, so every check
    // that touches it is in this one test.
    #[test]
    fn test_install_and_use_default_bridge() {
        submit_input_line("ignored before install");
        run_program("println ignored");

        let sink = CaptureSink::new();
        let bridge = install(Bridge::new(ScriptedEngine::factory, sink.clone())).unwrap();
        assert!(require().is_ok());

        let second = Bridge::new(ScriptedEngine::factory, CaptureSink::new());
        assert!(matches!(install(second), Err(Error::AlreadyInstalled)));

        run_program("read Hello, ");
        submit_input_line("World");
        bridge.wait_idle();
        assert_eq!(sink.contents(), "Hello, World\n");
    }
}
