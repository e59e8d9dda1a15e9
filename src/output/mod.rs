//! Output formatting module
//!
//! Console and JSON reporting of the engine's message stream.

mod formatter;

pub use formatter::{ConsoleReporter, MessageFormatter, OutputFormat};
