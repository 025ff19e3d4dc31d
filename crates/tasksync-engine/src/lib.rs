//! The reconciliation engines (§4.5-§4.7): One-Way, Two-Way, and N-Way,
//! built over `tasksync-core`'s ports and `tasksync-conflict`'s change
//! detection and resolution.

pub mod filter;
pub mod n_way;
pub mod one_way;
pub mod patch;
pub mod progress;
pub mod propagate;
pub mod result;
pub mod taxonomy;
pub mod two_way;

#[cfg(test)]
pub(crate) mod testing;

pub use n_way::NWayEngine;
pub use one_way::OneWayEngine;
pub use progress::{NoopCallbacks, Phase, ProgressEvent, SyncCallbacks};
pub use result::{SyncErrorRecord, SyncResult, SyncStats};
pub use two_way::TwoWayEngine;
