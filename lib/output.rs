// Where user-visible console text goes
use parking_lot::Mutex;

pub trait Output: Send + Sync {
    /// Feedback for the line currently being handled.
    fn println(&self, line: &str);

    /// Text produced off the input thread (inbound messages). Consoles
    /// typically redraw their prompt afterwards.
    fn notify(&self, line: &str) {
        self.println(line);
    }
}

/// Collects lines in memory.
#[derive(Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<String>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines collected since the last call.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl Output for MemoryOutput {
    fn println(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
