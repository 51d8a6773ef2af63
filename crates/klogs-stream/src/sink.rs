use std::io::Write;

/// Destination for formatted output lines.
///
/// Lines from different pods may interleave, but a single line is never split.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes each line to stdout
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout (e.g. `klogs | head`) is not worth failing a stream over
        let _ = writeln!(out, "{line}");
    }
}
