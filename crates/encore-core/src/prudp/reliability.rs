//! Sequencing, reordering and retransmission.
//!
//! Sequence ids are 16-bit and wrap. Ordering decisions use the wrapping
//! distance from the next expected id: distances below the window are ahead,
//! distances in the upper half of the space are behind (duplicates).

use std::{
    collections::{BTreeMap, HashMap},
    ops::Add,
    time::Duration,
};

use encore_proto::Packet;

use crate::error::ConnectionError;

/// Outbound sequence id generator.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u16,
}

impl SequenceCounter {
    /// Counter whose first id is `start`.
    pub fn new(start: u16) -> Self {
        Self { next: start }
    }

    /// Take the next id.
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    /// Id the next call will return.
    pub fn peek(&self) -> u16 {
        self.next
    }
}

/// Wrapping distance from `from` forward to `to`.
pub fn distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}

/// True if `seq` lies behind `expected` in wrapping order.
pub fn is_behind(expected: u16, seq: u16) -> bool {
    distance(expected, seq) >= 0x8000
}

/// Outcome of one inbound packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Arrival<T> {
    /// Items now deliverable, in sequence order
    Ready(Vec<T>),
    /// Held until the gap before it fills
    Buffered,
    /// Already delivered or already buffered
    Duplicate,
    /// Too far ahead to buffer
    OutOfWindow,
}

/// In-order delivery with a bounded reorder buffer.
#[derive(Debug)]
pub struct InboundWindow<T> {
    expected: u16,
    window: u16,
    buffered: HashMap<u16, T>,
}

impl<T> InboundWindow<T> {
    /// Window expecting `expected` next.
    pub fn new(expected: u16, window: u16) -> Self {
        Self { expected, window, buffered: HashMap::new() }
    }

    /// Next sequence id to deliver.
    pub fn expected(&self) -> u16 {
        self.expected
    }

    /// Packets held out of order.
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Accept the item carried by sequence id `seq`.
    pub fn accept(&mut self, seq: u16, item: T) -> Arrival<T> {
        let ahead = distance(self.expected, seq);

        if ahead == 0 {
            let mut ready = vec![item];
            self.expected = self.expected.wrapping_add(1);
            while let Some(next) = self.buffered.remove(&self.expected) {
                ready.push(next);
                self.expected = self.expected.wrapping_add(1);
            }
            return Arrival::Ready(ready);
        }

        if is_behind(self.expected, seq) {
            return Arrival::Duplicate;
        }

        if ahead >= self.window {
            return Arrival::OutOfWindow;
        }

        if self.buffered.contains_key(&seq) {
            return Arrival::Duplicate;
        }
        self.buffered.insert(seq, item);
        Arrival::Buffered
    }
}

/// A reliable packet awaiting acknowledgement.
#[derive(Debug, Clone)]
struct Pending<I> {
    packet: Packet,
    attempts: u32,
    next_attempt: I,
}

/// Unacknowledged outbound packets with exponential backoff.
#[derive(Debug)]
pub struct RetransmitQueue<I> {
    pending: BTreeMap<u16, Pending<I>>,
    base: Duration,
    max_attempts: u32,
}

impl<I> RetransmitQueue<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Queue retrying after `base`, `2 * base`, `4 * base`, ... for up to
    /// `max_attempts` sends.
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { pending: BTreeMap::new(), base, max_attempts: max_attempts.max(1) }
    }

    fn backoff(&self, attempts: u32) -> Duration {
        self.base.saturating_mul(1 << attempts.saturating_sub(1).min(16))
    }

    /// Record the first send of `packet` at `now`.
    pub fn track(&mut self, packet: Packet, now: I) {
        let next_attempt = now + self.backoff(1);
        self.pending.insert(packet.sequence_id, Pending { packet, attempts: 1, next_attempt });
    }

    /// Drop the packet with `sequence_id`. Returns false if it was unknown.
    pub fn acknowledge(&mut self, sequence_id: u16) -> bool {
        self.pending.remove(&sequence_id).is_some()
    }

    /// Packets whose retry time has passed.
    ///
    /// # Errors
    ///
    /// - `RetransmitExhausted` if a due packet already used every attempt
    pub fn due(&mut self, now: I) -> Result<Vec<Packet>, ConnectionError> {
        let mut resend = Vec::new();
        let max_attempts = self.max_attempts;
        let base = self.base;

        for (seq, entry) in &mut self.pending {
            if entry.next_attempt > now {
                continue;
            }
            if entry.attempts >= max_attempts {
                return Err(ConnectionError::RetransmitExhausted { sequence_id: *seq, attempts: entry.attempts });
            }
            entry.attempts += 1;
            entry.next_attempt = now + base.saturating_mul(1 << (entry.attempts - 1).min(16));
            resend.push(entry.packet.clone());
        }

        Ok(resend)
    }

    /// Packets awaiting acknowledgement.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing awaits acknowledgement.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use encore_proto::{PacketFlags, PacketType};

    use super::*;

    fn packet(seq: u16) -> Packet {
        let mut p = Packet::server(PacketType::Data, PacketFlags::RELIABLE | PacketFlags::NEED_ACK, 1);
        p.sequence_id = seq;
        p
    }

    #[test]
    fn counter_wraps() {
        let mut c = SequenceCounter::new(u16::MAX);
        assert_eq!(c.next_id(), u16::MAX);
        assert_eq!(c.next_id(), 0);
        assert_eq!(c.peek(), 1);
    }

    #[test]
    fn reorder_within_window() {
        let mut w = InboundWindow::new(10, 64);
        assert_eq!(w.accept(12, 'c'), Arrival::Buffered);
        assert_eq!(w.accept(11, 'b'), Arrival::Buffered);
        assert_eq!(w.accept(10, 'a'), Arrival::Ready(vec!['a', 'b', 'c']));
        assert_eq!(w.expected(), 13);
        assert_eq!(w.buffered_len(), 0);
    }

    #[test]
    fn duplicates_and_far_packets() {
        let mut w = InboundWindow::new(10, 64);
        assert_eq!(w.accept(10, ()), Arrival::Ready(vec![()]));
        assert_eq!(w.accept(10, ()), Arrival::Duplicate);
        assert_eq!(w.accept(12, ()), Arrival::Buffered);
        assert_eq!(w.accept(12, ()), Arrival::Duplicate);
        assert_eq!(w.accept(11 + 64, ()), Arrival::OutOfWindow);
    }

    #[test]
    fn window_spans_wrap() {
        let mut w = InboundWindow::new(u16::MAX, 64);
        assert_eq!(w.accept(0, 1), Arrival::Buffered);
        assert_eq!(w.accept(u16::MAX, 0), Arrival::Ready(vec![0, 1]));
        assert_eq!(w.expected(), 1);
        assert_eq!(w.accept(u16::MAX, 9), Arrival::Duplicate);
    }

    #[test]
    fn backoff_doubles_then_exhausts() {
        let base = Duration::from_secs(1);
        let mut q = RetransmitQueue::new(base, 3);
        let t0 = Duration::ZERO;
        q.track(packet(5), t0);

        assert!(q.due(t0 + Duration::from_millis(999)).unwrap().is_empty());
        assert_eq!(q.due(t0 + Duration::from_secs(1)).unwrap().len(), 1);
        // second retry waits 2s
        assert!(q.due(t0 + Duration::from_secs(2)).unwrap().is_empty());
        assert_eq!(q.due(t0 + Duration::from_secs(3)).unwrap().len(), 1);

        let err = q.due(t0 + Duration::from_secs(60)).unwrap_err();
        assert_eq!(err, ConnectionError::RetransmitExhausted { sequence_id: 5, attempts: 3 });
    }

    #[test]
    fn acknowledged_packets_are_not_resent() {
        let mut q = RetransmitQueue::new(Duration::from_secs(1), 5);
        q.track(packet(1), Duration::ZERO);
        q.track(packet(2), Duration::ZERO);

        assert!(q.acknowledge(1));
        assert!(!q.acknowledge(1));
        let resent = q.due(Duration::from_secs(1)).unwrap();
        assert_eq!(resent.iter().map(|p| p.sequence_id).collect::<Vec<_>>(), vec![2]);
    }
}
