//! Activity log lines received from the broker.

/// Log lines in arrival order, without repeats.
///
/// A line is compared by its exact text. Once present it is never added again,
/// even if the broker re-sends it after a reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogHistory {
    entries: Vec<String>,
}

impl LogHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `line` unless an identical line is already present.
    /// Returns false for a duplicate.
    pub fn append(&mut self, line: String) -> bool {
        if self.entries.contains(&line) {
            return false;
        }
        self.entries.push(line);
        true
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
