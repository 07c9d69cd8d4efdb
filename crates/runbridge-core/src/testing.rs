//! Line-oriented engine used by the crate's own tests.
//!
//! One statement per line:
//!
//! | Statement      | Effect                                            |
//! |----------------|---------------------------------------------------|
//! | `print X`      | text fragment `X`                                 |
//! | `println X`    | terminated line `X`                               |
//! | `newline`      | bare newline                                      |
//! | `read P`       | read one input line `L`, print line `P` + `L`     |
//! | `pause N`      | pause checkpoint at line `N`                      |
//! | `error M`      | write `M` to the error printer, signal runtime error, stop |
//! | `sleep MS`     | sleep                                             |
//! | `thread-name`  | print the worker thread's name                    |
//! | `panic`        | panic                                             |
//! | `syntax M`     | analysis fails with diagnostic `M`                |

use std::thread;
use std::time::Duration;

use crate::engine::{Engine, EngineIo, EngineListener, GateOutcome, InputSource, ScopeInfo};

#[derive(Debug, Clone)]
enum Statement {
    Print(String),
    Println(String),
    Newline,
    Read(String),
    Pause(u32),
    Error(String),
    Sleep(u64),
    ThreadName,
    Panic,
}

pub(crate) struct ScriptedEngine {
    source: String,
    io: EngineIo,
    listeners: Vec<Box<dyn EngineListener>>,
    program: Vec<(u32, Statement)>,
}

impl ScriptedEngine {
    pub(crate) fn factory(source: &str, io: EngineIo) -> Box<dyn Engine> {
        Box::new(Self {
            source: source.to_string(),
            io,
            listeners: Vec::new(),
            program: Vec::new(),
        })
    }

    fn parse(&self) -> Result<Vec<(u32, Statement)>, String> {
        let mut program = Vec::new();
        for (index, raw) in self.source.lines().enumerate() {
            let line = index as u32 + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let (command, arg) = raw.split_once(' ').unwrap_or((raw, ""));
            let statement = match command {
                "print" => Statement::Print(arg.to_string()),
                "println" => Statement::Println(arg.to_string()),
                "newline" => Statement::Newline,
                "read" => Statement::Read(arg.to_string()),
                "pause" => Statement::Pause(arg.trim().parse().unwrap_or(line)),
                "error" => Statement::Error(arg.to_string()),
                "sleep" => Statement::Sleep(arg.trim().parse().unwrap_or(0)),
                "thread-name" => Statement::ThreadName,
                "panic" => Statement::Panic,
                "syntax" => return Err(format!("line {}: {}", line, arg)),
                other => return Err(format!("line {}: unknown statement '{}'", line, other)),
            };
            program.push((line, statement));
        }
        Ok(program)
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn EngineListener)) {
        for listener in self.listeners.iter_mut() {
            f(listener.as_mut());
        }
    }

    /// Run one statement; `false` ends execution.
    fn step(&mut self, line: u32, statement: Statement) -> bool {
        match statement {
            Statement::Print(text) => self.io.stdout.print(&text),
            Statement::Println(text) => self.io.stdout.println(&text),
            Statement::Newline => self.io.stdout.newline(),
            Statement::Read(prefix) => {
                let input = self.io.input.read_line();
                if self.io.cancel.is_cancelled() {
                    return false;
                }
                self.notify(|l| l.read_statement_executed(line));
                self.io.interactive_out.println(&format!("{}{}", prefix, input));
            }
            Statement::Pause(at) => {
                let gate = self.io.gate.clone();
                self.notify(|l| l.execution_paused(&gate, Some(at), false));
                if gate.wait() == GateOutcome::Aborted {
                    return false;
                }
            }
            Statement::Error(message) => {
                self.io.stderr.println(&message);
                self.notify(|l| l.runtime_error());
                return false;
            }
            Statement::Sleep(ms) => thread::sleep(Duration::from_millis(ms)),
            Statement::ThreadName => {
                let name = thread::current().name().unwrap_or("").to_string();
                self.io.stdout.println(&name);
            }
            Statement::Panic => panic!("scripted panic on line {}", line),
        }
        !self.io.cancel.is_cancelled()
    }
}

impl Engine for ScriptedEngine {
    fn add_listener(&mut self, listener: Box<dyn EngineListener>) {
        self.listeners.push(listener);
    }

    fn analyze(&mut self, _debug: bool) -> bool {
        let result = self.parse();
        let success = result.is_ok();
        match result {
            Ok(program) => self.program = program,
            Err(message) => self.io.stderr.println(&format!("syntax error: {}", message)),
        }
        self.notify(|l| l.analysis_finished(success));
        success
    }

    fn execute(&mut self, _debug: bool) {
        self.notify(|l| l.execution_started());
        let global = ScopeInfo {
            depth: 1,
            name: "global".to_string(),
            variables: Vec::new(),
        };
        self.notify(|l| l.stack_pushed(&global));

        for (line, statement) in std::mem::take(&mut self.program) {
            if !self.step(line, statement) {
                break;
            }
        }

        self.notify(|l| l.stack_popped());
        self.notify(|l| l.execution_stopped());
    }

    fn resume(&self) {
        self.io.gate.resume();
    }
}
