//! Bounded input buffering for pipeline inputs.
//!
//! Each input port owns one [`InputBuffer`]. Producers push, the owning
//! node pops. The buffer is the back-pressure surface of the runtime: when a
//! producer outpaces a consumer the overflow policy drops samples *here*, at
//! the consumer side, and the producer never blocks.
//!
//! The container itself is not synchronized; the owning port serializes
//! access (hold times are sub-microsecond, so the port's lock stays cheap).
//!
//! Invariants:
//! * With a COUNT limit `k`: `len() <= k` after every push.
//! * With a MEMORY limit `m`: the sum of payload footprints of *stored*
//!   entries never exceeds `m` by more than one entry (the newest entry is
//!   always admitted so a single oversized sample still flows).
//! * The last popped value is retained and re-served by [`InputBuffer::probe`]
//!   so a node that already ran once can re-read its stale input.

mod buffer;

pub use buffer::{BufferKind, InputBuffer, LimitKind, OverflowPolicy, PushOutcome};
