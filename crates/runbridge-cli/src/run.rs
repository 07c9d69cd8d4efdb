//! `runbridge run`: execute one program with stdin as its input.

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use std::fs;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use runbridge_core::{Bridge, PausePolicy, RunOutcome, SessionEventEnvelope, WriterSink};
use runbridge_rhai::RhaiEngineFactory;

use crate::{settings, RunArgs};

/// Exit code for a run cancelled by Ctrl+C.
const EXIT_INTERRUPTED: i32 = 130;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a program file and return the process exit code.
pub fn run_file(args: RunArgs) -> Result<i32> {
    if !args.file.exists() {
        anyhow::bail!("File not found: {}", args.file.display());
    }
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read file: {}", args.file.display()))?;

    let mut config = settings::load(args.config.as_deref())?;
    if let Some(pause) = args.pause {
        config.run.pause = pause;
    }
    if let Some(overlap) = args.overlap {
        config.run.overlap = overlap;
    }
    config.run.debug |= args.debug;
    config.validate()?;

    let host_controls = config.run.pause == PausePolicy::Host;
    let bridge = Arc::new(Bridge::with_config(
        RhaiEngineFactory::new(),
        WriterSink::new(io::stdout()),
        config,
    ));
    let events = args.events.then(|| bridge.subscribe());

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to install Ctrl+C handler")?;

    log::info!("Running {}", args.file.display());
    let handle = bridge.start_run(source).context("Failed to start program")?;
    spawn_stdin_reader(bridge.clone(), host_controls)?;

    let report = loop {
        if let Some(report) = handle.wait_timeout(POLL_INTERVAL) {
            break report;
        }
        if interrupted.swap(false, Ordering::SeqCst) {
            log::info!("Interrupted by user (Ctrl+C), cancelling run {}", handle.id());
            handle.cancel();
        }
        if let Some(events) = &events {
            print_events(events);
        }
    };
    if let Some(events) = &events {
        print_events(events);
    }

    log::info!(
        "Run {} finished: {:?} ({} reads, {} pauses)",
        report.session,
        report.outcome,
        report.reads,
        report.pauses
    );

    Ok(exit_code(report.outcome))
}

/// Process exit code for how a run ended.
fn exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed => 0,
        RunOutcome::Cancelled => EXIT_INTERRUPTED,
        outcome => {
            debug_assert!(outcome.is_failure());
            1
        }
    }
}

/// What the stdin reader did with one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineAction {
    Input,
    Resume,
    Stop,
}

/// Forward stdin lines to the bridge. With host-controlled pauses,
/// `:resume` and `:stop` are commands rather than input.
fn spawn_stdin_reader(bridge: Arc<Bridge>, host_controls: bool) -> Result<()> {
    thread::Builder::new()
        .name("runbridge-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        let action = dispatch_line(&bridge, line, host_controls);
                        log::trace!("stdin line handled as {:?}", action);
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            log::debug!("stdin closed");
        })
        .context("Failed to spawn stdin reader")?;
    Ok(())
}

fn dispatch_line(bridge: &Bridge, line: String, host_controls: bool) -> LineAction {
    if host_controls {
        match line.trim() {
            ":resume" => {
                if let Err(e) = bridge.resume() {
                    log::warn!("{}", e);
                }
                return LineAction::Resume;
            }
            ":stop" => {
                if let Err(e) = bridge.stop() {
                    log::warn!("{}", e);
                }
                return LineAction::Stop;
            }
            _ => {}
        }
    }

    bridge.submit_input_line(line);
    LineAction::Input
}

/// One JSON object per event, flat apart from the `session` field.
fn event_json(envelope: &SessionEventEnvelope) -> serde_json::Result<String> {
    serde_json::to_string(envelope)
}

fn print_events(events: &Receiver<SessionEventEnvelope>) {
    for envelope in events.try_iter() {
        match event_json(&envelope) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => log::warn!("Failed to encode event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbridge_core::{BridgeConfig, CaptureSink, SessionEvent};

    fn host_bridge() -> (Bridge, CaptureSink) {
        let mut config = BridgeConfig::default();
        config.run.pause = PausePolicy::Host;
        let sink = CaptureSink::new();
        let bridge = Bridge::with_config(RhaiEngineFactory::new(), sink.clone(), config);
        (bridge, sink)
    }

    fn wait_paused(bridge: &Bridge) {
        for _ in 0..400 {
            if bridge.is_paused() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("program never paused");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(RunOutcome::Completed), 0);
        assert_eq!(exit_code(RunOutcome::Cancelled), 130);
        assert_eq!(exit_code(RunOutcome::AnalysisFailed), 1);
        assert_eq!(exit_code(RunOutcome::RuntimeError), 1);
        assert_eq!(exit_code(RunOutcome::Panicked), 1);
    }

    #[test]
    fn test_resume_command_releases_pause() {
        let (bridge, sink) = host_bridge();
        let handle = bridge
            .start_run("write(\"a\");\npause();\nprint(read_line());")
            .unwrap();
        wait_paused(&bridge);

        assert_eq!(dispatch_line(&bridge, " :resume ".to_string(), true), LineAction::Resume);
        assert_eq!(dispatch_line(&bridge, "hello".to_string(), true), LineAction::Input);

        let report = handle.join();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(exit_code(report.outcome), 0);
        assert_eq!(sink.contents(), "ahello\n");
    }

    #[test]
    fn test_stop_command_cancels_run() {
        let (bridge, sink) = host_bridge();
        let handle = bridge.start_run("pause();\nprint(\"never\");").unwrap();
        wait_paused(&bridge);

        assert_eq!(dispatch_line(&bridge, ":stop".to_string(), true), LineAction::Stop);

        let report = handle.join();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(exit_code(report.outcome), EXIT_INTERRUPTED);
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_commands_are_input_without_host_controls() {
        let sink = CaptureSink::new();
        let bridge = Bridge::new(RhaiEngineFactory::new(), sink.clone());
        let handle = bridge.start_run("print(read_line());").unwrap();

        assert_eq!(dispatch_line(&bridge, ":resume".to_string(), false), LineAction::Input);

        assert_eq!(handle.join().outcome, RunOutcome::Completed);
        assert_eq!(sink.contents(), ":resume\n");
    }

    #[test]
    fn test_event_json_is_flat() {
        let envelope = SessionEventEnvelope {
            session: 1,
            event: SessionEvent::ExecutionPaused {
                line: Some(3),
                was_print: false,
            },
        };
        assert_eq!(
            event_json(&envelope).unwrap(),
            r#"{"session":1,"event":"execution_paused","line":3,"was_print":false}"#
        );

        let envelope = SessionEventEnvelope {
            session: 2,
            event: SessionEvent::ExecutionStarted,
        };
        assert_eq!(
            event_json(&envelope).unwrap(),
            r#"{"session":2,"event":"execution_started"}"#
        );
    }
}
