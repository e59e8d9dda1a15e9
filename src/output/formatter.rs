//! Console reporting for engine messages
//!
//! Renders the message stream either as human-readable lines or as one JSON
//! object per message.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use crate::messages::{Message, MessageSink};
use crate::models::RunSummary;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "table" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Turns messages into report lines
pub struct MessageFormatter {
    format: OutputFormat,
    colorize: bool,
    verbose: bool,
    // test unique id -> display name, learned from TestStarting
    names: Mutex<HashMap<String, String>>,
}

impl MessageFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
            verbose: false,
            names: Mutex::new(HashMap::new()),
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Also report Starting/Finished of every level
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    fn names(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn test_name(&self, message: &Message) -> String {
        message
            .subject_id()
            .and_then(|id| self.names().get(id).cloned())
            .unwrap_or_else(|| "<unknown test>".to_string())
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.colorize {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    /// Render one message; `None` when the message is not reported in this format
    pub fn format_message(&self, message: &Message) -> Option<String> {
        if let Message::TestStarting(m) = message {
            if let Some(id) = &m.ids.test {
                self.names().insert(id.clone(), m.display_name.clone());
            }
        }

        match self.format {
            OutputFormat::Json => serde_json::to_string(message).ok(),
            OutputFormat::Text => self.format_text(message),
        }
    }

    fn format_text(&self, message: &Message) -> Option<String> {
        let line = match message {
            Message::TestAssemblyStarting(m) => {
                format!("Running {} [{}]", m.assembly_name, m.test_environment)
            }
            Message::TestPassed(m) => format!(
                "  {} {} ({}ms)",
                self.paint("32", "✓ PASS"),
                self.test_name(message),
                m.execution_time.as_millis()
            ),
            Message::TestFailed(m) => {
                let mut line = format!(
                    "  {} {} ({}ms)",
                    self.paint("31", "✗ FAIL"),
                    self.test_name(message),
                    m.execution_time.as_millis()
                );
                for text in m.error.combined_message().lines() {
                    line.push_str(&format!("\n      {text}"));
                }
                line
            }
            Message::TestSkipped(m) => format!(
                "  {} {}: {}",
                self.paint("33", "○ SKIP"),
                self.test_name(message),
                m.reason
            ),
            Message::TestNotRun(_) => format!("  {} {}", self.paint("90", "- NOT RUN"), self.test_name(message)),
            Message::TestOutput(m) => format!("      | {}", m.output.trim_end()),
            Message::Diagnostic(m) => format!("  [diagnostic] {}", m.message),
            Message::Error(m) => format!("{} {}", self.paint("31", "! ERROR"), m.error.combined_message()),
            other => {
                if let Some(error) = other.error() {
                    format!("{} {}: {}", self.paint("31", "! CLEANUP"), other.name(), error.combined_message())
                } else if self.verbose {
                    match other.finished_summary() {
                        Some(summary) => format!("    {} {}", other.name(), summary),
                        None => format!("    {}", other),
                    }
                } else {
                    return None;
                }
            }
        };
        Some(line)
    }

    /// Format the final run summary
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                output.push_str("\n══════════════════════════════════════════\n");
                output.push_str(&format!(
                    "  Total: {}  Passed: {}  Failed: {}  Skipped: {}  Not run: {}\n",
                    summary.total,
                    summary.passed_count(),
                    summary.failed,
                    summary.skipped,
                    summary.not_run
                ));
                output.push_str(&format!(
                    "  Pass rate: {:.1}%  Time: {}ms\n",
                    summary.pass_rate(),
                    summary.time.as_millis()
                ));
                output.push_str("══════════════════════════════════════════");
                output
            }
        }
    }
}

/// Message sink writing formatted messages to a writer (stdout by default)
pub struct ConsoleReporter {
    formatter: MessageFormatter,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    pub fn new(formatter: MessageFormatter) -> Self {
        Self::with_writer(formatter, Box::new(std::io::stdout()))
    }

    pub fn with_writer(formatter: MessageFormatter, writer: Box<dyn Write + Send>) -> Self {
        Self {
            formatter,
            writer: Mutex::new(writer),
        }
    }

    pub fn formatter(&self) -> &MessageFormatter {
        &self.formatter
    }
}

impl MessageSink for ConsoleReporter {
    fn on_message(&self, message: &Message) -> bool {
        if let Some(line) = self.formatter.format_message(message) {
            let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = writeln!(writer, "{line}") {
                tracing::warn!("Failed to write report line: {}", e);
            }
        }
        true
    }
}
