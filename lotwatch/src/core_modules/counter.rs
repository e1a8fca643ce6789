/// The running event count: the cumulative number of flagged cells across all
/// processed frames. Grows by the size of each frame's flagged set, never
/// shrinks, and lives only for the process lifetime.
#[derive(Debug, Default)]
pub struct EventCounter {
    total: u64,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the number of events observed in one frame.
    pub fn add(&mut self, events: usize) {
        self.total = self.total.saturating_add(events as u64);
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
