//! DATA fragmentation.
//!
//! A message larger than the fragment size travels as consecutive DATA
//! packets. Every fragment but the last carries a non-zero fragment id
//! (1, 2, ... wrapping past 255 back to 1); the last carries 0.

use bytes::{Bytes, BytesMut};

use crate::error::ConnectionError;

/// Largest reassembled message accepted.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Split `message` into `(fragment_id, chunk)` pairs of at most `size` bytes.
///
/// An empty message is one empty final fragment.
pub fn split(message: &Bytes, size: usize) -> Vec<(u8, Bytes)> {
    let size = size.max(1);
    if message.len() <= size {
        return vec![(0, message.clone())];
    }

    let count = message.len().div_ceil(size);
    let mut next_id = 0u8;
    (0..count)
        .map(|i| {
            let chunk = message.slice(i * size..((i + 1) * size).min(message.len()));
            if i + 1 == count {
                (0, chunk)
            } else {
                next_id = next_id.wrapping_add(1).max(1);
                (next_id, chunk)
            }
        })
        .collect()
}

/// Accumulates in-order fragments until the final one arrives.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: BytesMut,
    pending: bool,
}

impl Reassembler {
    /// Empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next fragment in sequence order. Returns the complete
    /// message when `fragment_id` is 0.
    pub fn push(&mut self, fragment_id: u8, chunk: &[u8]) -> Result<Option<Bytes>, ConnectionError> {
        if self.buffer.len() + chunk.len() > MAX_MESSAGE_SIZE {
            self.buffer.clear();
            self.pending = false;
            return Err(ConnectionError::MessageTooLarge { max: MAX_MESSAGE_SIZE });
        }

        self.buffer.extend_from_slice(chunk);
        if fragment_id == 0 {
            self.pending = false;
            return Ok(Some(self.buffer.split().freeze()));
        }

        self.pending = true;
        Ok(None)
    }

    /// True while a partial message is buffered.
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_message_is_one_final_fragment() {
        let parts = split(&Bytes::from_static(b"hello"), 750);
        assert_eq!(parts, vec![(0, Bytes::from_static(b"hello"))]);
    }

    #[test]
    fn large_message_ends_with_zero() {
        let message = Bytes::from(vec![7u8; 2000]);
        let parts = split(&message, 750);

        let ids: Vec<u8> = parts.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert_eq!(parts.iter().map(|(_, c)| c.len()).collect::<Vec<_>>(), vec![750, 750, 500]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let parts = split(&Bytes::from(vec![0u8; 1500]), 750);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].0, 0);
        assert_eq!(parts[1].1.len(), 750);
    }

    #[test]
    fn fragment_ids_skip_zero_when_wrapping() {
        let parts = split(&Bytes::from(vec![0u8; 300]), 1);
        assert_eq!(parts[254].0, 255);
        assert_eq!(parts[255].0, 1);
        assert_eq!(parts.last().map(|(id, _)| *id), Some(0));
        assert!(parts[..parts.len() - 1].iter().all(|(id, _)| *id != 0));
    }

    #[test]
    fn reassembles_in_order() {
        let message = Bytes::from((0..2000).map(|i| i as u8).collect::<Vec<_>>());
        let mut r = Reassembler::new();

        let mut out = None;
        for (id, chunk) in split(&message, 750) {
            out = r.push(id, &chunk).unwrap();
        }
        assert_eq!(out, Some(message));
        assert!(!r.is_pending());
    }
}
