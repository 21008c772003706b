use std::collections::VecDeque;

/// Lines kept in memory for the managed process.
pub const DEFAULT_MAX_LINES: usize = 100;

/// Lines returned by status snapshots.
pub const RECENT_LINES: usize = 20;

/// Bounded ring buffer of captured stdout/stderr lines.
///
/// Not synchronized on its own; it lives inside the supervisor state and is
/// guarded by the supervisor lock.
#[derive(Debug)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<String>,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines),
        }
    }

    /// Append a line, dropping the oldest if over capacity.
    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Return the last `n` lines (or all if `n` exceeds stored count).
    pub fn tail(&self, n: usize) -> Vec<String> {
        let start = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(start).cloned().collect()
    }

    /// Remove and yield all lines, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = String> + '_ {
        self.lines.drain(..)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}
