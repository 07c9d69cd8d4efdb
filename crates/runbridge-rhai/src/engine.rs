//! [`Engine`] implementation over Rhai.

use std::sync::atomic::Ordering;

use rhai::{EvalAltResult, AST};
use runbridge_core::{Engine, EngineFactory, EngineIo, EngineListener, ScopeInfo};

use crate::api::{configured_engine, register, ScriptContext};
use crate::check::{compile, Diagnostic};

/// Builds a [`RhaiEngine`] per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RhaiEngineFactory;

impl RhaiEngineFactory {
    pub fn new() -> Self {
        Self
    }
}

impl EngineFactory for RhaiEngineFactory {
    fn create(&self, source: &str, io: EngineIo) -> Box<dyn Engine> {
        Box::new(RhaiEngine::new(source, io))
    }
}

/// One Rhai program and the engine that runs it.
pub struct RhaiEngine {
    engine: rhai::Engine,
    source: String,
    ast: Option<AST>,
    context: ScriptContext,
}

impl RhaiEngine {
    pub fn new(source: &str, io: EngineIo) -> Self {
        let context = ScriptContext::new(io);
        let mut engine = configured_engine();
        register(&mut engine, &context);

        Self {
            engine,
            source: source.to_string(),
            ast: None,
            context,
        }
    }

    fn report_runtime_error(&self, err: &EvalAltResult) {
        let diagnostic = Diagnostic::from_runtime(err);
        log::debug!("script failed: {}", diagnostic);
        self.context
            .io
            .stderr
            .println(&format!("Runtime error: {}", diagnostic));
        self.context.listeners.notify(|l| l.runtime_error());
    }
}

/// Termination raised inside a script function arrives wrapped in the call error.
fn is_termination(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_termination(inner),
        _ => false,
    }
}

impl Engine for RhaiEngine {
    fn add_listener(&mut self, listener: Box<dyn EngineListener>) {
        self.context.listeners.add(listener);
    }

    fn analyze(&mut self, _debug: bool) -> bool {
        let success = match compile(&self.engine, &self.source) {
            Ok(ast) => {
                self.ast = Some(ast);
                true
            }
            Err(diagnostic) => {
                self.context
                    .io
                    .stderr
                    .println(&format!("Syntax error: {}", diagnostic));
                false
            }
        };
        self.context.listeners.notify(|l| l.analysis_finished(success));
        success
    }

    fn execute(&mut self, debug: bool) {
        let Some(ast) = self.ast.take() else {
            log::warn!("execute called without a successful analysis");
            return;
        };
        self.context.debug.store(debug, Ordering::Relaxed);

        let listeners = self.context.listeners.clone();
        listeners.notify(|l| l.execution_started());
        let global = ScopeInfo {
            depth: 1,
            name: "global".to_string(),
            variables: ast.iter_functions().map(|f| f.name.to_string()).collect(),
        };
        listeners.notify(|l| l.stack_pushed(&global));

        match self.engine.run_ast(&ast) {
            Ok(()) => {}
            Err(err) if is_termination(&err) || self.context.io.cancel.is_cancelled() => {
                log::debug!("script terminated: {}", err);
            }
            Err(err) => self.report_runtime_error(&err),
        }

        listeners.notify(|l| l.stack_popped());
        listeners.notify(|l| l.execution_stopped());
    }

    fn resume(&self) {
        self.context.io.gate.resume();
    }
}
