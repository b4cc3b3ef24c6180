//! Progress reporting for fetch tracks.
//!
//! The client reports through [`ProgressCallback`] so it stays independent
//! of how progress is drawn: the CLI plugs in `indicatif` bars, tests and
//! library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running fetch.
///
/// Implementations must be `Send + Sync` because the three tracks share
/// them across concurrently polled futures.
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of records.
    fn set_total(&self, total: u64);

    /// Advances by `delta` records.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Marks the work as finished with a final message.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
