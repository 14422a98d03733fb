//! Property tests: the bound invariants hold for arbitrary push sequences.

use core_buffer::{BufferKind, InputBuffer, OverflowPolicy};
use core_data::{AnyData, Value};
use proptest::prelude::*;

fn payload(size: usize, t: i64) -> AnyData {
    AnyData::new(Value::bytes(vec![0u8; size]), t)
}

proptest! {
    #[test]
    fn count_bound_never_exceeded(
        cap in 1usize..16,
        sizes in proptest::collection::vec(0usize..256, 0..64),
    ) {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(cap));
        for (i, s) in sizes.iter().enumerate() {
            b.push(payload(*s, i as i64));
            prop_assert!(b.len() <= cap, "len {} > cap {}", b.len(), cap);
        }
    }

    #[test]
    fn memory_bound_holds_beyond_first_entry(
        cap in 64usize..4096,
        sizes in proptest::collection::vec(0usize..1024, 1..64),
    ) {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::memory(cap));
        for (i, s) in sizes.iter().enumerate() {
            b.push(payload(*s, i as i64));
            // The newest entry is always admitted; beyond one entry the
            // byte total must respect the cap.
            prop_assert!(b.len() == 1 || b.byte_len() <= cap);
        }
    }

    #[test]
    fn fifo_pop_order_is_push_order_when_not_overflowing(
        count in 1usize..32,
    ) {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(64));
        for i in 0..count {
            b.push(payload(0, i as i64));
        }
        for i in 0..count {
            prop_assert_eq!(b.next().unwrap().time(), i as i64);
        }
    }

    #[test]
    fn drop_accounting_is_exact(
        cap in 1usize..8,
        pushes in 0usize..64,
    ) {
        let mut b = InputBuffer::new(BufferKind::Fifo, OverflowPolicy::count(cap));
        for i in 0..pushes {
            b.push(payload(0, i as i64));
        }
        let expected = pushes.saturating_sub(cap) as u64;
        prop_assert_eq!(b.total_dropped(), expected);
        prop_assert_eq!(b.len(), pushes.min(cap));
    }
}
