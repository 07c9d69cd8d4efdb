//! Rhai engine for runbridge.
//!
//! Implements the runbridge [`Engine`](runbridge_core::Engine) boundary on
//! top of the Rhai scripting language. Programs talk to the host through
//! a small console API (see [`api`]):
//!
//! ```rhai
//! let name = read_line();
//! print("Hello, " + name);
//! pause();
//! ```

pub mod api;
pub mod check;
pub mod engine;

pub use api::configured_engine;
pub use check::{check_script, CheckResult, Diagnostic};
pub use engine::{RhaiEngine, RhaiEngineFactory};

// Re-export rhai for hosts that extend the engine
pub use rhai;
