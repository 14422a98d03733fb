//! Property tests over the frame grammar: arbitrary frame sequences round
//! trip, and the trailing mirror supports backward recovery of the last
//! value frame.

use core_archive::{Frame, FrameReader, FrameWriter};
use proptest::prelude::*;
use std::io::Cursor;

#[derive(Debug, Clone)]
enum Op {
    Start(String),
    End,
    Value(String, String, Vec<u8>),
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}".prop_map(|s| s.to_string())
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        name_strategy().prop_map(Op::Start),
        Just(Op::End),
        (
            name_strategy(),
            name_strategy(),
            proptest::collection::vec(any::<u8>(), 0..128)
        )
            .prop_map(|(n, t, p)| Op::Value(n, t, p)),
    ]
}

proptest! {
    #[test]
    fn arbitrary_frame_sequences_round_trip(ops in proptest::collection::vec(op_strategy(), 0..24)) {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        for op in &ops {
            match op {
                Op::Start(n) => w.write_start(n).unwrap(),
                Op::End => w.write_end().unwrap(),
                Op::Value(n, t, p) => w.write_value(n, t, p).unwrap(),
            }
        }
        let bytes = w.into_inner().into_inner();
        let mut r = FrameReader::new(Cursor::new(bytes));
        for op in &ops {
            let frame = r.read_frame().unwrap();
            match (op, frame) {
                (Op::Start(n), Frame::Start(m)) => prop_assert_eq!(n, &m),
                (Op::End, Frame::End) => {}
                (Op::Value(n, t, p), Frame::Value { name, type_name, payload }) => {
                    prop_assert_eq!(n, &name);
                    prop_assert_eq!(t, &type_name);
                    prop_assert_eq!(p, &payload);
                }
                (op, frame) => prop_assert!(false, "mismatch: wrote {:?}, read {:?}", op, frame),
            }
        }
    }

    #[test]
    fn backward_scan_after_any_prefix(
        prefix in proptest::collection::vec(op_strategy(), 0..12),
        last_payload in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        for op in &prefix {
            match op {
                Op::Start(n) => w.write_start(n).unwrap(),
                Op::End => w.write_end().unwrap(),
                Op::Value(n, t, p) => w.write_value(n, t, p).unwrap(),
            }
        }
        w.write_value("trailer", "bytes", &last_payload).unwrap();
        let bytes = w.into_inner().into_inner();
        let len = bytes.len() as u64;
        let mut r = FrameReader::new(Cursor::new(bytes));
        r.seek(len).unwrap();
        let (type_name, payload) = r.read_value_backward().unwrap();
        prop_assert_eq!(type_name, "bytes");
        prop_assert_eq!(payload, last_payload);
    }

    #[test]
    fn forward_skip_matches_read(ops in proptest::collection::vec(op_strategy(), 1..16)) {
        let mut w = FrameWriter::new(Cursor::new(Vec::new()));
        for op in &ops {
            match op {
                Op::Start(n) => w.write_start(n).unwrap(),
                Op::End => w.write_end().unwrap(),
                Op::Value(n, t, p) => w.write_value(n, t, p).unwrap(),
            }
        }
        w.write_value("sentinel", "i64", &1i64.to_le_bytes()).unwrap();
        let bytes = w.into_inner().into_inner();
        let mut r = FrameReader::new(Cursor::new(bytes));
        for _ in &ops {
            r.skip_frame().unwrap();
        }
        match r.read_frame().unwrap() {
            Frame::Value { name, .. } => prop_assert_eq!(name, "sentinel"),
            other => prop_assert!(false, "expected sentinel value, got {:?}", other),
        }
    }
}
