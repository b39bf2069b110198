//! mrv-storage: append-only, hash-chained snapshot storage.
//!
//! Implementations of [`SnapshotStore`] persist one [`Snapshot`] per
//! orchestrator run and enforce the `Draft -> Locked` lifecycle in their
//! write paths.

mod chain;
mod clock;
pub mod conformance;
mod error;
mod file;
mod ledger;
mod memory;
mod record;
mod traits;

pub use chain::{verify_chain, BreakKind, ChainBreak, ChainReport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::StorageError;
pub use file::FileSnapshotStore;
pub use memory::InMemorySnapshotStore;
pub use record::{Snapshot, SnapshotState};
pub use traits::SnapshotStore;
