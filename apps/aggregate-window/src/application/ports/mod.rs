//! Port Interfaces
//!
//! Contracts the infrastructure adapters implement.
//!
//! - `LineSink`: destination for the formatted lines of each print tick

/// Errors raised by an output sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the underlying stream failed.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for emitted lines.
///
/// Called from the print scheduler only, one batch per tick. Lines arrive
/// without trailing newlines.
pub trait LineSink: Send + Sync {
    /// Write one tick's lines, in order.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the lines could not be written.
    fn write_lines(&self, lines: &[String]) -> Result<(), SinkError>;
}
