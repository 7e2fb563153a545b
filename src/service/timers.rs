use crate::types::ServerHandle;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Pending forced kills, earliest first. Entries are never cancelled; a timer
/// whose server is already gone is simply ignored when it fires.
#[derive(Debug, Default)]
pub struct KillTimers {
    queue: BinaryHeap<Reverse<(Instant, ServerHandle)>>,
}

impl KillTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, handle: ServerHandle) {
        self.queue.push(Reverse((deadline, handle)));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Removes and returns every timer due at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<ServerHandle> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, handle))) = self.queue.peek() {
            if *deadline > now {
                break;
            }
            expired.push(*handle);
            self.queue.pop();
        }
        expired
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
