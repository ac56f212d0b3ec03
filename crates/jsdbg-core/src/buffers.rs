//! Bounded ring buffers for console output and thrown exceptions.
//!
//! Both buffers retain at most the most recent 1000 entries; the oldest
//! entry is dropped on overflow.

use std::collections::VecDeque;

use serde::Serialize;

/// Retention cap shared by both buffers.
pub const RING_CAPACITY: usize = 1000;

// ── Entries ──────────────────────────────────────────────────────────────────

/// One console line: a `consoleAPICalled` event or a captured child
/// stdout/stderr line.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleMessage {
    /// Milliseconds since epoch.
    pub ts: u64,
    /// `log`, `warn`, `error`, ... or `stdout`/`stderr` for child output.
    pub level: String,
    pub text: String,
    /// `url:line` of the call site when the event carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One uncaught (or reported) exception.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionEntry {
    /// Milliseconds since epoch.
    pub ts: u64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Flattened stack-trace string, one frame per line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

// ── RingBuffer ───────────────────────────────────────────────────────────────

/// Fixed-capacity FIFO that drops the oldest entry on overflow.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(RING_CAPACITY)
    }
}

/// Current wall-clock time in milliseconds since epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
