//! Script-facing API.
//!
//! Registers the console functions a program uses to talk to the host:
//!
//! - `print(x)` - write `x` followed by a line break
//! - `write(x)` - write `x` with no line break
//! - `newline()` - write a bare line break
//! - `read_line()` - take the next submitted input line
//! - `read_int()` - take the next input line as an integer
//! - `pause()` - pause checkpoint

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rhai::{
    Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, NativeCallContext, Position,
    FLOAT, FUNC_TO_STRING, INT,
};
use runbridge_core::{EngineIo, EngineListener, GateOutcome, InputSource};

/// Listeners registered on one engine, shared with the script functions.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    inner: Arc<Mutex<Vec<Box<dyn EngineListener>>>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Box<dyn EngineListener>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn notify(&self, mut f: impl FnMut(&mut dyn EngineListener)) {
        let mut listeners = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter_mut() {
            f(listener.as_mut());
        }
    }
}

/// Everything the registered functions close over.
#[derive(Clone)]
pub(crate) struct ScriptContext {
    pub(crate) io: EngineIo,
    pub(crate) listeners: Listeners,
    /// Set from the `debug` flag passed to `execute`.
    pub(crate) debug: Arc<AtomicBool>,
    /// Line of the `print` call being handled, 0 when unknown.
    print_line: Arc<AtomicU32>,
}

impl ScriptContext {
    pub(crate) fn new(io: EngineIo) -> Self {
        Self {
            io,
            listeners: Listeners::default(),
            debug: Arc::new(AtomicBool::new(false)),
            print_line: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Notify listeners of a checkpoint, then wait on the gate.
    pub(crate) fn checkpoint(&self, line: Option<u32>, was_print: bool) -> GateOutcome {
        let gate = self.io.gate.clone();
        self.listeners
            .notify(|l| l.execution_paused(&gate, line, was_print));
        gate.wait()
    }
}

/// Error used to end evaluation once the run has been cancelled.
pub(crate) fn terminated(pos: Position) -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::UNIT, pos).into()
}

fn line_of(ctx: &NativeCallContext) -> Option<u32> {
    ctx.call_position().line().map(|l| l as u32)
}

/// A Rhai engine with the limits every runbridge script gets.
pub fn configured_engine() -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(4096, 4096);
    engine.set_max_call_levels(4096);
    // Operator errors only carry a position when dispatched as calls.
    engine.set_fast_operators(false);

    engine
}

/// Register the console API on `engine`, wired to `context`.
pub(crate) fn register(engine: &mut Engine, context: &ScriptContext) {
    // print(): terminated line, plus a checkpoint in debug mode
    register_print::<ImmutableString>(engine, &context.print_line);
    register_print::<bool>(engine, &context.print_line);
    register_print::<char>(engine, &context.print_line);
    register_print::<INT>(engine, &context.print_line);
    register_print::<FLOAT>(engine, &context.print_line);
    register_print::<()>(engine, &context.print_line);
    register_print::<Array>(engine, &context.print_line);
    register_print::<Map>(engine, &context.print_line);
    register_print::<Dynamic>(engine, &context.print_line);

    let ctx = context.clone();
    engine.on_print(move |text| {
        ctx.io.stdout.println(text);
        let line = ctx.print_line.swap(0, Ordering::Relaxed);
        if ctx.debug.load(Ordering::Relaxed)
            && ctx.checkpoint((line != 0).then_some(line), true) == GateOutcome::Aborted
        {
            // The progress hook ends evaluation at the next operation.
            log::debug!("print checkpoint aborted");
        }
    });

    engine.on_debug(move |text, source, pos| {
        let loc = match (source, pos) {
            (Some(src), pos) if !pos.is_none() => format!(" ({}:{})", src, pos),
            (Some(src), _) => format!(" ({})", src),
            (None, pos) if !pos.is_none() => format!(" ({})", pos),
            _ => String::new(),
        };
        log::debug!("[script]{} {}", loc, text);
    });

    // Cancellation ends evaluation at the next operation
    let cancel = context.io.cancel.clone();
    engine.on_progress(move |_| {
        if cancel.is_cancelled() {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    let out = context.io.stdout.clone();
    engine.register_fn("write", move |value: Dynamic| {
        out.print(&value.to_string());
    });

    let out = context.io.stdout.clone();
    engine.register_fn("newline", move || {
        out.newline();
    });

    let ctx = context.clone();
    engine.register_fn(
        "read_line",
        move |call: NativeCallContext| -> Result<String, Box<EvalAltResult>> {
            read_input(&ctx, &call)
        },
    );

    let ctx = context.clone();
    engine.register_fn(
        "read_int",
        move |call: NativeCallContext| -> Result<i64, Box<EvalAltResult>> {
            let line = read_input(&ctx, &call)?;
            line.trim().parse::<i64>().map_err(|_| {
                EvalAltResult::ErrorRuntime(
                    format!("expected an integer, got '{}'", line).into(),
                    call.call_position(),
                )
                .into()
            })
        },
    );

    let ctx = context.clone();
    engine.register_fn(
        "pause",
        move |call: NativeCallContext| -> Result<(), Box<EvalAltResult>> {
            match ctx.checkpoint(line_of(&call), false) {
                GateOutcome::Resumed => Ok(()),
                GateOutcome::Aborted => Err(terminated(call.call_position())),
            }
        },
    );
}

/// `print` for one argument type, remembering the call-site line for the
/// print handler. Text comes from the same `to_string` the built-in uses.
fn register_print<T>(engine: &mut Engine, print_line: &Arc<AtomicU32>)
where
    T: Clone + Send + Sync + 'static,
{
    let print_line = print_line.clone();
    engine.register_fn(
        "print",
        move |call: NativeCallContext, value: T| -> Result<ImmutableString, Box<EvalAltResult>> {
            print_line.store(line_of(&call).unwrap_or(0), Ordering::Relaxed);
            call.call_native_fn(FUNC_TO_STRING, (value,))
        },
    );
}

fn read_input(ctx: &ScriptContext, call: &NativeCallContext) -> Result<String, Box<EvalAltResult>> {
    let line = ctx.io.input.read_line();
    if ctx.io.cancel.is_cancelled() {
        return Err(terminated(call.call_position()));
    }
    let at = line_of(call).unwrap_or(0);
    ctx.listeners.notify(|l| l.read_statement_executed(at));
    Ok(line)
}
