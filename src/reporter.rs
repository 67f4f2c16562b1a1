//! Progress reporting actor.
//!
//! Workers and the controller hold cheap [`Reporter`] handles and send
//! [`ProgressEvent`]s over an unbounded channel; a single task drives one
//! `indicatif` bar per phase, prints lines above it and forwards the text to
//! the log, so nothing else prints concurrently.

use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::Level;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Event sent to the reporter task.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A new counted phase begins
    PhaseStarted { label: String, total: usize },
    /// `done` units of the current phase are finished
    Advanced { done: usize },
    /// Live pool snapshot during mining
    Pool { pending: usize, running: usize, finished: usize },
    /// A worker picked up a shard
    ShardStarted { label: String },
    /// A worker finished a shard, successfully or not
    ShardFinished { label: String, ok: bool },
    /// The current phase ended
    PhaseFinished,
    /// Free-form message
    Log { level: Level, message: String, success: bool },
}

/// Sending half of the reporter. Sends never block and never fail loudly:
/// a closed reporter simply drops events.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl Reporter {
    /// Reporter plus the raw receiving end, for custom consumers and tests.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reporter backed by a task rendering to the terminal.
    ///
    /// The task ends once every handle is dropped; await the returned handle
    /// to flush the last lines.
    pub fn console() -> (Self, JoinHandle<()>) {
        let (reporter, rx) = Self::channel();
        let handle = tokio::spawn(render(rx));
        (reporter, handle)
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    pub fn phase_started(&self, label: impl Into<String>, total: usize) {
        self.send(ProgressEvent::PhaseStarted {
            label: label.into(),
            total,
        });
    }

    pub fn advance(&self, done: usize) {
        self.send(ProgressEvent::Advanced { done });
    }

    pub fn pool(&self, pending: usize, running: usize, finished: usize) {
        self.send(ProgressEvent::Pool {
            pending,
            running,
            finished,
        });
    }

    pub fn shard_started(&self, label: impl Into<String>) {
        self.send(ProgressEvent::ShardStarted { label: label.into() });
    }

    pub fn shard_finished(&self, label: impl Into<String>, ok: bool) {
        self.send(ProgressEvent::ShardFinished {
            label: label.into(),
            ok,
        });
    }

    pub fn phase_finished(&self) {
        self.send(ProgressEvent::PhaseFinished);
    }

    /// Drop this handle and wait for the render task to drain.
    ///
    /// Only returns once every other clone is gone too.
    pub async fn finish(self, handle: JoinHandle<()>) {
        drop(self);
        let _ = handle.await;
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message.into(), false);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(Level::Info, message.into(), true);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message.into(), false);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message.into(), false);
    }

    fn log(&self, level: Level, message: String, success: bool) {
        self.send(ProgressEvent::Log {
            level,
            message,
            success,
        });
    }
}

async fn render(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::PhaseStarted { label, total } => {
                log::info!("{} started ({} units)", label, total);
                if let Some(previous) = bar.take() {
                    previous.finish_and_clear();
                }
                let pb = progress_bar(total as u64);
                pb.set_message(label);
                bar = Some(pb);
            }
            ProgressEvent::Advanced { done } => {
                if let Some(pb) = &bar {
                    let done = done as u64;
                    if pb.length().is_some_and(|len| done > len) {
                        pb.set_length(done);
                    }
                    pb.set_position(done);
                }
            }
            ProgressEvent::Pool {
                pending,
                running,
                finished,
            } => {
                log::debug!("pool: pending={} running={} finished={}", pending, running, finished);
                if let Some(pb) = &bar {
                    pb.set_length((pending + running + finished) as u64);
                    pb.set_position(finished as u64);
                }
            }
            ProgressEvent::ShardStarted { label } => {
                log::info!("start {}", label);
                print_line(bar.as_ref(), &format!("{} {}", "->".blue(), label));
            }
            ProgressEvent::ShardFinished { label, ok } => {
                log::info!("done {} ok={}", label, ok);
                let mark = if ok { "ok".green() } else { "failed".red() };
                print_line(bar.as_ref(), &format!("{} {} {}", "<-".blue(), label, mark));
            }
            ProgressEvent::PhaseFinished => {
                if let Some(pb) = bar.take() {
                    log::info!("phase finished ({}/{})", pb.position(), pb.length().unwrap_or(0));
                    pb.finish_and_clear();
                }
            }
            ProgressEvent::Log {
                level,
                message,
                success,
            } => {
                log::log!(level, "{}", message);
                print_line(bar.as_ref(), &styled(level, message, success));
            }
        }
    }

    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{msg:.cyan} [{bar:30}] {pos}/{len} ({percent}%) [{elapsed_precise}]")
            .map(|style| style.progress_chars("#>."))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb
}

/// Print above the bar, or plainly when no phase is running. `suspend` still
/// prints when the bar is hidden (output not a terminal).
fn print_line(bar: Option<&ProgressBar>, line: &str) {
    match bar {
        Some(pb) => pb.suspend(|| println!("{}", line)),
        None => println!("{}", line),
    }
}

fn styled(level: Level, message: String, success: bool) -> String {
    match level {
        Level::Error => message.red().to_string(),
        Level::Warn => message.yellow().to_string(),
        _ if success => message.green().to_string(),
        _ => message,
    }
}

/// `Xm Ys` above a minute, otherwise `N.NN seconds`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs > 60.0 {
        format!("{}m {}s", elapsed.as_secs() / 60, elapsed.as_secs() % 60)
    } else {
        format!("{:.2} seconds", secs)
    }
}
