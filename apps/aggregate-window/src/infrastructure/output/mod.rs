//! Output Sinks
//!
//! Adapters for the `LineSink` port.

use std::io::Write;

use parking_lot::Mutex;

use crate::application::ports::{LineSink, SinkError};

/// Writes each line to standard output.
///
/// Logs go to stderr, so stdout carries emitted lines only.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    /// Create a stdout sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LineSink for StdoutSink {
    fn write_lines(&self, lines: &[String]) -> Result<(), SinkError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Collects lines in memory.
///
/// Used by tests and by anything that wants to inspect output directly.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    batches: Mutex<Vec<usize>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of lines in each `write_lines` call, in call order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }
}

impl LineSink for MemorySink {
    fn write_lines(&self, lines: &[String]) -> Result<(), SinkError> {
        self.lines.lock().extend_from_slice(lines);
        self.batches.lock().push(lines.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_batches() {
        let sink = MemorySink::new();
        sink.write_lines(&["a".to_string()]).unwrap();
        sink.write_lines(&["b".to_string(), "c".to_string()]).unwrap();

        assert_eq!(sink.lines(), vec!["a", "b", "c"]);
        assert_eq!(sink.batch_sizes(), vec![1, 2]);
    }
}
