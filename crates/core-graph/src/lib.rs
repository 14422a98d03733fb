//! The processing-graph runtime.
//!
//! Nodes are units of computation exposing declared, named ports; outputs
//! push [`core_data::AnyData`] values into connected inputs' bounded
//! buffers; asynchronous nodes run on a dedicated per-node worker
//! ([`TaskPool`]). The runtime guarantees:
//!
//! * at most one `apply` per node executing at any time (run-lock),
//! * producers never block — overflow drops at the consumer's input buffer,
//! * `DataSent` emission strictly precedes `ProcessingDone`,
//! * FIFO delivery per edge in synchronous mode and in non-overflowing
//!   asynchronous mode.
//!
//! Scheduling is thread-per-node on purpose: a shared pool invites
//! priority-inversion deadlocks between display dispatch and compute, and a
//! flood of pushes during a long `apply` coalesces into a single follow-up
//! batch on the owning worker.

pub mod connection;
pub mod error;
pub mod event;
pub mod executor_hook;
pub mod list;
pub mod node;
pub mod ops;
pub mod persist;
pub mod pool;
pub mod port;
pub mod registry;
pub mod task_pool;

pub use connection::{Address, Connection, OpenMode, PortKind, PortRef};
pub use error::{ErrorCode, ErrorCodeSet, ProcessingError};
pub use event::NodeEvent;
pub use list::ProcessingList;
pub use node::{Context, Node, NodeBuilder, Operation, ScheduleStrategy};
pub use pool::{Pool, find_pool};
pub use registry::{Registry, registry};
pub use task_pool::TaskPool;
