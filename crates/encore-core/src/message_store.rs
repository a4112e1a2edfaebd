//! In-process message inboxes.
//!
//! Messages are kept per recipient in insertion order and expire after their
//! lifetime. Expired entries are invisible to every read immediately; the
//! periodic [`MessageStore::purge`] only reclaims their memory.

use std::collections::{HashMap, HashSet, VecDeque};

use encore_proto::{MessageRecipient, PackedDateTime, TextMessage, UserMessage};

/// Inbox key: raw recipient type and principal or gathering id.
type InboxKey = (u32, u32);

fn inbox_key(recipient: &MessageRecipient) -> InboxKey {
    (recipient.recipient_type, recipient.inbox_id())
}

/// A message as submitted by a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Addressee
    pub recipient: MessageRecipient,
    /// Thread parent
    pub parent_id: u32,
    /// Sender principal
    pub sender_pid: u32,
    /// Sender display name
    pub sender: String,
    /// Seconds the message stays visible
    pub lifetime: u32,
    /// Client flags
    pub flags: u32,
    /// Subject line
    pub subject: String,
    /// Text body
    pub body: String,
}

/// A message held in an inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Unique 16-bit id
    pub id: u32,
    /// Unix seconds at reception
    pub received_at: u64,
    /// Submitted fields
    pub message: NewMessage,
}

impl StoredMessage {
    /// True once `now` reaches `received_at + lifetime`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.received_at + u64::from(self.message.lifetime) <= now
    }

    /// Header without body.
    pub fn header(&self) -> UserMessage {
        UserMessage {
            id: self.id,
            parent_id: self.message.parent_id,
            sender_pid: self.message.sender_pid,
            reception_time: PackedDateTime::from_unix_secs(self.received_at),
            lifetime: self.message.lifetime,
            flags: self.message.flags,
            subject: self.message.subject.clone(),
            sender: self.message.sender.clone(),
            recipient: self.message.recipient,
        }
    }

    /// Full text message.
    pub fn text_message(&self) -> TextMessage {
        TextMessage { header: self.header(), body: self.message.body.clone() }
    }
}

/// Time-expiring inboxes keyed by recipient.
///
/// # Invariants
///
/// - Message ids are unique among stored messages and never 0
/// - Each inbox preserves delivery order
/// - A read at `now` returns a message only while `now < received_at + lifetime`
#[derive(Debug, Default)]
pub struct MessageStore {
    next_id: u16,
    live_ids: HashSet<u32>,
    inboxes: HashMap<InboxKey, VecDeque<StoredMessage>>,
}

impl MessageStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> Option<u32> {
        for _ in 0..=u16::MAX {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id == 0 {
                continue;
            }
            let id = u32::from(self.next_id);
            if self.live_ids.insert(id) {
                return Some(id);
            }
        }
        None
    }

    /// Append to the recipient's inbox. Returns the new message id, or
    /// `None` if every id is in use.
    pub fn deliver(&mut self, message: NewMessage, now: u64) -> Option<u32> {
        let id = self.allocate_id()?;
        let key = inbox_key(&message.recipient);
        self.inboxes.entry(key).or_default().push_back(StoredMessage { id, received_at: now, message });
        Some(id)
    }

    /// A message as stored, expired or not.
    pub fn get(&self, recipient: &MessageRecipient, id: u32) -> Option<&StoredMessage> {
        self.inboxes.get(&inbox_key(recipient))?.iter().find(|m| m.id == id)
    }

    fn visible<'a>(&'a self, recipient: &MessageRecipient, now: u64) -> impl Iterator<Item = &'a StoredMessage> {
        self.inboxes.get(&inbox_key(recipient)).into_iter().flatten().filter(move |m| !m.is_expired(now))
    }

    /// Number of visible messages.
    pub fn count(&self, recipient: &MessageRecipient, now: u64) -> usize {
        self.visible(recipient, now).count()
    }

    /// Headers of visible messages, `offset` and `size` applied in delivery
    /// order.
    pub fn headers(&self, recipient: &MessageRecipient, offset: usize, size: usize, now: u64) -> Vec<UserMessage> {
        self.visible(recipient, now).skip(offset).take(size).map(StoredMessage::header).collect()
    }

    /// Visible messages whose id is in `ids`, in delivery order. Unless
    /// `leave_on_server`, the returned messages are removed.
    pub fn retrieve(
        &mut self,
        recipient: &MessageRecipient,
        ids: &[u32],
        leave_on_server: bool,
        now: u64,
    ) -> Vec<TextMessage> {
        let found: Vec<TextMessage> = self
            .visible(recipient, now)
            .filter(|m| ids.contains(&m.id))
            .map(StoredMessage::text_message)
            .collect();

        if !leave_on_server {
            let taken: Vec<u32> = found.iter().map(|m| m.header.id).collect();
            self.delete(recipient, &taken);
        }
        found
    }

    /// Remove messages by id. Returns how many were removed.
    pub fn delete(&mut self, recipient: &MessageRecipient, ids: &[u32]) -> usize {
        let Some(inbox) = self.inboxes.get_mut(&inbox_key(recipient)) else {
            return 0;
        };

        let before = inbox.len();
        let live_ids = &mut self.live_ids;
        inbox.retain(|m| {
            let keep = !ids.contains(&m.id);
            if !keep {
                live_ids.remove(&m.id);
            }
            keep
        });
        before - inbox.len()
    }

    /// Remove every message of a recipient. Returns how many were removed.
    pub fn delete_all(&mut self, recipient: &MessageRecipient) -> usize {
        let Some(inbox) = self.inboxes.remove(&inbox_key(recipient)) else {
            return 0;
        };
        for m in &inbox {
            self.live_ids.remove(&m.id);
        }
        inbox.len()
    }

    /// Drop expired messages and empty inboxes. Returns how many messages
    /// were dropped.
    pub fn purge(&mut self, now: u64) -> usize {
        let mut dropped = 0;
        let live_ids = &mut self.live_ids;
        self.inboxes.retain(|_, inbox| {
            inbox.retain(|m| {
                let expired = m.is_expired(now);
                if expired {
                    live_ids.remove(&m.id);
                    dropped += 1;
                }
                !expired
            });
            !inbox.is_empty()
        });
        dropped
    }

    /// Messages held, expired or not.
    pub fn len(&self) -> usize {
        self.live_ids.len()
    }

    /// True if no messages are held.
    pub fn is_empty(&self) -> bool {
        self.live_ids.is_empty()
    }
}
