use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

pub const DEFAULT_MESSAGE_LIMIT: usize = 10;

/// Most-recent-N window of rendered chat lines, oldest first.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a line, returning how many old lines were evicted.
    pub fn push(&mut self, line: String) -> usize {
        self.entries.push_back(line);
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LIMIT)
    }
}

/// Log shared between the broadcaster (sole writer) and rendering sessions.
pub type SharedLog = Arc<RwLock<MessageLog>>;

pub fn shared(capacity: usize) -> SharedLog {
    Arc::new(RwLock::new(MessageLog::new(capacity)))
}
