//! Log sinks that capture build step output as it streams.

use std::sync::Mutex;

/// Receives build output line by line. Implementations must tolerate writes
/// from multiple steps of the same pipeline (never concurrently; steps are
/// sequential).
pub trait ProgressLog: Send + Sync {
    fn write(&self, line: &str);
}

/// Captures everything written, for inclusion in a build handle and for
/// error finders to scan.
#[derive(Default)]
pub struct InMemoryProgressLog {
    lines: Mutex<Vec<String>>,
}

impl InMemoryProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.lines.lock().unwrap().join("\n")
    }
}

impl ProgressLog for InMemoryProgressLog {
    fn write(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}
