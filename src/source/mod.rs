//! Snapshot loader abstraction.
//!
//! A loader fetches the full, time-range-scoped state the dashboard starts
//! from. It is pulled on startup, on every (re)connect of the live channel and
//! whenever the range changes while the channel is down.

mod http;

pub use http::{HttpSnapshotLoader, HttpSnapshotLoaderBuilder};

use std::fmt::Debug;

use async_trait::async_trait;
use heatwatch_types::{Snapshot, TimeRange};

use crate::SyncError;

/// Trait for fetching bulk snapshots.
///
/// Implementations must be cheap to share: the dashboard runs each load as a
/// separate task holding an `Arc` to the loader.
///
/// # Example
///
/// ```no_run
/// use heatwatch::{HttpSnapshotLoader, SnapshotLoader, TimeRange};
///
/// # tokio_test::block_on(async {
/// let loader = HttpSnapshotLoader::builder()
///     .base_url("http://localhost:5000")
///     .build()
///     .unwrap();
/// let snapshot = loader.load(&TimeRange::default()).await.unwrap();
/// println!("{} panels", snapshot.len());
/// # });
/// ```
#[async_trait]
pub trait SnapshotLoader: Send + Sync + Debug {
    /// Fetch the snapshot for a range.
    ///
    /// Network failures, timeouts and non-2xx responses are
    /// [`SyncError::Transport`]; bodies that do not hold a valid snapshot are
    /// [`SyncError::Protocol`].
    async fn load(&self, range: &TimeRange) -> Result<Snapshot, SyncError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}
