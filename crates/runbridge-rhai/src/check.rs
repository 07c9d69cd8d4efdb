//! Compile-only checking of scripts.
//!
//! Used by the engine's analysis phase and by `runbridge check`.

use std::fmt;

use rhai::{EvalAltResult, ParseError, Position, AST};

use crate::api::configured_engine;

/// A problem found in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Error message.
    pub message: String,
    /// Line number (1-based).
    pub line: Option<u32>,
    /// Column number (1-based).
    pub column: Option<u32>,
}

impl Diagnostic {
    /// Create a diagnostic from a Rhai parse error.
    pub fn from_parse(err: &ParseError) -> Self {
        Self::at(err.0.to_string(), err.position())
    }

    /// Create a diagnostic from a Rhai runtime error.
    pub fn from_runtime(err: &EvalAltResult) -> Self {
        let mut message = err.to_string();
        // Rhai appends the position in parentheses; it is kept separately.
        let suffix = format!(" ({})", err.position());
        if !err.position().is_none() && message.ends_with(&suffix) {
            message.truncate(message.len() - suffix.len());
        }
        Self::at(message, err.position())
    }

    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: if pos.is_none() {
                None
            } else {
                pos.line().map(|l| l as u32)
            },
            column: if pos.is_none() {
                None
            } else {
                pos.position().map(|c| c as u32)
            },
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "line {}, column {}: {}", line, column, self.message)
            }
            (Some(line), None) => write!(f, "line {}: {}", line, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Result of checking a script.
#[derive(Debug, Default)]
pub struct CheckResult {
    /// Parse errors (compilation failures).
    pub diagnostics: Vec<Diagnostic>,
    /// Names of the functions the script defines.
    pub functions: Vec<String>,
}

impl CheckResult {
    /// Check if the script compiled.
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compile `source` and return the AST, or the diagnostic explaining why not.
pub(crate) fn compile(engine: &rhai::Engine, source: &str) -> Result<AST, Diagnostic> {
    engine.compile(source).map_err(|e| Diagnostic::from_parse(&e))
}

/// Check a script without running it.
pub fn check_script(source: &str) -> CheckResult {
    let engine = configured_engine();
    match compile(&engine, source) {
        Ok(ast) => {
            let mut functions: Vec<String> =
                ast.iter_functions().map(|f| f.name.to_string()).collect();
            functions.sort();
            functions.dedup();
            CheckResult {
                diagnostics: Vec::new(),
                functions,
            }
        }
        Err(diagnostic) => CheckResult {
            diagnostics: vec![diagnostic],
            functions: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let result =
            check_script("fn greet(n) { print(\"hi \" + n); }\nlet x = read_line();\ngreet(x);");
        assert!(result.is_ok());
        assert_eq!(result.functions, vec!["greet".to_string()]);
    }

    #[test]
    fn test_syntax_error_has_position() {
        let result = check_script("let a = 1;\nlet b = ;");
        assert!(!result.is_ok());
        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.line, Some(2));
        assert!(diagnostic.column.is_some());
        assert!(diagnostic.to_string().starts_with("line 2, column "));
    }

    #[test]
    fn test_unknown_functions_are_not_compile_errors() {
        // Calls are resolved when they run.
        assert!(check_script("no_such_function(1, 2);").is_ok());
    }

    #[test]
    fn test_runtime_diagnostic_strips_position() {
        let engine = configured_engine();
        let err = engine.run("let x = 1;\nlet y = x / 0;").unwrap_err();
        let diagnostic = Diagnostic::from_runtime(&err);
        assert_eq!(diagnostic.line, Some(2));
        assert!(!diagnostic.message.contains("line 2"));
    }

    #[test]
    fn test_operator_assignment_error_has_line() {
        let engine = configured_engine();
        let err = engine
            .run("let x = 9223372036854775807;\nx += 1;")
            .unwrap_err();
        let diagnostic = Diagnostic::from_runtime(&err);
        assert_eq!(diagnostic.line, Some(2));
        assert!(diagnostic.to_string().starts_with("line 2, column "));
    }
}
