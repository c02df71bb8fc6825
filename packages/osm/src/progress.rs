//! Progress of the decode pass.
//!
//! Sources report how many primitives they have pushed into the store.
//! The CLI renders these reports as a progress bar; library callers and
//! tests pass [`null_progress`].

use std::sync::Arc;

/// Receives decode progress. Called from decoder worker threads.
///
/// Every method defaults to doing nothing.
pub trait ProgressCallback: Send + Sync {
    /// Primitive count, for sources that know it up front.
    fn set_total(&self, _total: u64) {}

    /// Primitives decoded so far.
    fn set_position(&self, _pos: u64) {}

    fn inc(&self, _delta: u64) {}

    fn set_message(&self, _msg: String) {}

    /// The pass is over.
    fn finish(&self, _msg: String) {}
}

/// Discards every report.
pub struct NullProgress;

impl ProgressCallback for NullProgress {}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
