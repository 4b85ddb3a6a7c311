//! Operator-visible progress stream.
//!
//! One line per event. Error lines start with `Error: ` and warnings
//! with `Warning: ` so they stand out from plain progress lines. The
//! handle is cheap to clone and is safe to share with spawned tasks.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Line-oriented writer for migration progress.
#[derive(Clone)]
pub struct Progress {
    out: Sink,
}

impl Progress {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// A stream that drops everything.
    pub fn discard() -> Self {
        Self::new(std::io::sink())
    }

    /// A stream backed by an in-memory buffer, returned alongside it.
    pub fn capture() -> (Self, CaptureBuffer) {
        let buffer = CaptureBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    pub fn line(&self, message: impl Display) {
        self.write_line(format_args!("{message}"));
    }

    pub fn warning(&self, message: impl Display) {
        self.write_line(format_args!("Warning: {message}"));
    }

    pub fn error(&self, message: impl Display) {
        self.write_line(format_args!("Error: {message}"));
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) {
        // A poisoned or failing sink only loses output.
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// Shared in-memory buffer behind [`Progress::capture`].
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    /// Everything written so far, split into lines.
    pub fn lines(&self) -> Vec<String> {
        let bytes = match self.bytes.lock() {
            Ok(b) => b.clone(),
            Err(_) => return Vec::new(),
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.bytes.lock() {
            Ok(mut b) => {
                b.extend_from_slice(buf);
                Ok(buf.len())
            }
            Err(_) => Err(std::io::Error::other("capture buffer poisoned")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
