//! Property tests for session bookkeeping
//!
//! - PID stack: bounded, deduplicated, most-recent-first
//! - Inbound window: any arrival order inside the window delivers in order,
//!   across the 16-bit wrap
//! - Gathering discovery: only the creator pid offsets change
//! - Message store: expiry is visible before any purge

use encore_core::{
    gathering::{CREATOR_PID_OFFSETS, Gathering, read_u32_at},
    message_store::{MessageStore, NewMessage},
    pid_stack::{PID_STACK_CAPACITY, PidStack},
    platform::Platform,
    prudp::reliability::{Arrival, InboundWindow},
};
use encore_proto::MessageRecipient;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_pid_stack_bounded_and_unique(pushes in prop::collection::vec(1u32..20, 0..64)) {
        let mut stack = PidStack::new();
        for &pid in &pushes {
            stack.push(pid);
            prop_assert_eq!(stack.top(), Some(pid));
        }

        prop_assert!(stack.len() <= PID_STACK_CAPACITY);

        let entries: Vec<u32> = stack.iter().collect();
        let mut unique = entries.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(unique.len(), entries.len());

        // the most recent distinct pushes survive, newest first
        let mut expected = Vec::new();
        for &pid in pushes.iter().rev() {
            if !expected.contains(&pid) {
                expected.push(pid);
            }
        }
        expected.truncate(PID_STACK_CAPACITY);
        prop_assert_eq!(entries, expected);
    }

    #[test]
    fn prop_window_delivers_in_order(start in any::<u16>(), order in Just((0u16..32).collect::<Vec<_>>()).prop_shuffle()) {
        let mut window = InboundWindow::new(start, 64);
        let mut delivered = Vec::new();

        for offset in order {
            let seq = start.wrapping_add(offset);
            match window.accept(seq, seq) {
                Arrival::Ready(items) => delivered.extend(items),
                Arrival::Buffered => {},
                other => prop_assert!(false, "unexpected arrival {:?}", other),
            }
        }

        let expected: Vec<u16> = (0..32).map(|o| start.wrapping_add(o)).collect();
        prop_assert_eq!(delivered, expected);
        prop_assert_eq!(window.buffered_len(), 0);
    }

    #[test]
    fn prop_discovery_only_rewrites_creator_pid(
        contents in prop::collection::vec(any::<u8>(), 0..96),
        creator_pid in any::<u32>(),
    ) {
        let gathering = Gathering::new(900, "host", creator_pid, contents.clone(), Platform::Xbox360, 0);
        let out = gathering.discovery_contents();

        prop_assert_eq!(out.len(), contents.len());
        for offset in CREATOR_PID_OFFSETS {
            if contents.len() >= offset + 4 {
                prop_assert_eq!(read_u32_at(&out, offset), Some(creator_pid));
            }
        }
        for (i, (a, b)) in out.iter().zip(&contents).enumerate() {
            let rewritten = CREATOR_PID_OFFSETS.iter().any(|&o| (o..o + 4).contains(&i) && contents.len() >= o + 4);
            if !rewritten {
                prop_assert_eq!(a, b);
            }
        }
    }
}

#[test]
fn expired_message_is_gone_before_the_sweep() {
    let mut store = MessageStore::new();
    let inbox = MessageRecipient::principal(42);
    let t = 1_700_000_000;

    store
        .deliver(
            NewMessage {
                recipient: inbox,
                parent_id: 0,
                sender_pid: 7,
                sender: "sender".to_string(),
                lifetime: 60,
                flags: 0,
                subject: "hi".to_string(),
                body: "1:0:ping".to_string(),
            },
            t,
        )
        .unwrap();

    assert_eq!(store.headers(&inbox, 0, 10, t + 30).len(), 1);
    assert!(store.headers(&inbox, 0, 10, t + 61).is_empty());
    assert_eq!(store.count(&inbox, t + 61), 0);
    assert!(store.retrieve(&inbox, &[1], true, t + 61).is_empty());

    assert_eq!(store.purge(t + 61), 1);
    assert!(store.is_empty());
}
