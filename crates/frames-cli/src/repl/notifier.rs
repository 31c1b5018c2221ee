//! Output notification system for the REPL
//!
//! Provides a trait-based system for handling REPL output, so tests and
//! other front ends can capture what the console would print.

use std::sync::Mutex;

/// Trait for handling REPL output notifications
pub trait ReplNotifier: Send + Sync {
    /// Handle regular output
    fn on_output(&self, content: &str);

    /// Handle error output
    fn on_error(&self, content: &str);

    /// Handle a command result with timing information
    fn on_result(&self, output: &str, duration_us: u64, quiet: bool);
}

/// Default console-based notifier
#[derive(Debug, Default)]
pub struct DefaultNotifier;

impl DefaultNotifier {
    /// Create a new default notifier
    pub fn new() -> Self {
        Self
    }
}

impl ReplNotifier for DefaultNotifier {
    fn on_output(&self, content: &str) {
        if !content.is_empty() {
            println!("{content}");
        }
    }

    fn on_error(&self, content: &str) {
        eprintln!("{content}");
    }

    fn on_result(&self, output: &str, duration_us: u64, quiet: bool) {
        if output.is_empty() {
            return;
        }
        if quiet {
            println!("{output}");
        } else {
            println!("{output} ({duration_us}us)");
        }
    }
}

/// Collects every line instead of printing it
#[derive(Debug, Default)]
pub struct BufferNotifier {
    lines: Mutex<Vec<String>>,
}

impl BufferNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, errors prefixed with `error: `
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl ReplNotifier for BufferNotifier {
    fn on_output(&self, content: &str) {
        self.push(content.to_string());
    }

    fn on_error(&self, content: &str) {
        self.push(format!("error: {content}"));
    }

    fn on_result(&self, output: &str, _duration_us: u64, _quiet: bool) {
        self.push(output.to_string());
    }
}
