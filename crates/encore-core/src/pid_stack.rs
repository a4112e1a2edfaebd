//! Recently authenticated principals of one connection.

use std::collections::VecDeque;

/// Capacity of a [`PidStack`].
pub const PID_STACK_CAPACITY: usize = 8;

/// Bounded, deduplicated most-recent-first stack of PIDs.
///
/// # Invariants
///
/// - No PID appears twice
/// - At most [`PID_STACK_CAPACITY`] entries; a push on a full stack evicts the
///   oldest entry
/// - Pushing a PID already present moves it to the top
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidStack {
    entries: VecDeque<u32>,
}

impl PidStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `pid` the most recent entry.
    pub fn push(&mut self, pid: u32) {
        if let Some(pos) = self.entries.iter().position(|&p| p == pid) {
            self.entries.remove(pos);
        } else if self.entries.len() == PID_STACK_CAPACITY {
            self.entries.pop_back();
        }
        self.entries.push_front(pid);
    }

    /// True if `pid` is anywhere on the stack.
    pub fn contains(&self, pid: u32) -> bool {
        self.entries.contains(&pid)
    }

    /// Most recent entry.
    pub fn top(&self) -> Option<u32> {
        self.entries.front().copied()
    }

    /// Remove `pid` if present.
    pub fn remove(&mut self, pid: u32) -> bool {
        match self.entries.iter().position(|&p| p == pid) {
            Some(pos) => self.entries.remove(pos).is_some(),
            None => false,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_existing_moves_to_top() {
        let mut stack = PidStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(1);

        assert_eq!(stack.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn full_stack_evicts_oldest() {
        let mut stack = PidStack::new();
        for pid in 1..=9 {
            stack.push(pid);
        }

        assert_eq!(stack.len(), PID_STACK_CAPACITY);
        assert!(!stack.contains(1));
        assert_eq!(stack.top(), Some(9));
    }

    #[test]
    fn remove() {
        let mut stack = PidStack::new();
        stack.push(5);
        assert!(stack.remove(5));
        assert!(!stack.remove(5));
        assert!(stack.is_empty());
    }
}
