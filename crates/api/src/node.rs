//! Storage node client types.

use crate::{BlobId, PinError, PinResult};
use std::sync::Arc;

/// Progress callback invoked while a blob download is streaming.
///
/// Receives `(bytes_so_far, total_bytes)`. The total is `None` when the
/// storage node does not report a size for the blob, in which case callers
/// should not attempt percentage math.
pub type ProgressCb = Box<dyn FnMut(u64, Option<u64>) + Send>;

/// Classified failure of a blob fetch.
///
/// The pin engine's retry policy keys off this classification, so
/// implementations must take care to distinguish a stalled transfer from
/// an unreachable node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The transfer started but timed out or broke mid-stream.
    /// Expected to be retriable.
    #[error("download timed out: {0}")]
    DownloadTimeout(PinError),

    /// The storage node could not be reached at all. Not retried: a dead
    /// connection is not expected to heal within the retry horizon.
    #[error("storage node unreachable: {0}")]
    ConnectionTimeout(PinError),

    /// Any other failure. Treated as retriable by the engine.
    #[error(transparent)]
    Other(PinError),
}

/// A pinned blob and the cumulative size of everything it references.
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct PinnedBlob {
    /// The blob's content identifier.
    pub id: BlobId,

    /// Cumulative size in bytes.
    pub size: u64,
}

/// Trait for implementing a client for the local storage node.
///
/// All calls are blocking: the engine's workers park on these for the
/// duration of the request, bounded by the implementation's own timeouts.
#[cfg_attr(feature = "mockall", mockall::automock)]
pub trait NodeClient: 'static + Send + Sync + std::fmt::Debug {
    /// Get the node's own peer identity.
    fn peer_id(&self) -> PinResult<String>;

    /// Download a blob to a discard sink, invoking `on_progress` as bytes
    /// arrive. Completing the transfer is the point; the bytes themselves
    /// are not kept.
    fn fetch(
        &self,
        blob_id: &BlobId,
        on_progress: ProgressCb,
    ) -> Result<(), FetchError>;

    /// Ask the node to retain a blob indefinitely. Idempotent; recursive
    /// pin semantics are the node's concern.
    fn pin(&self, blob_id: &BlobId) -> PinResult<()>;

    /// List all recursively pinned blobs with their cumulative sizes.
    fn pinned_blobs(&self) -> PinResult<Vec<PinnedBlob>>;

    /// Bytes still available to the node's repository.
    fn free_space(&self) -> PinResult<u64>;

    /// Total bytes the node has sent since it started.
    fn throughput(&self) -> PinResult<u64>;

    /// Filesystem path of the node's repository.
    fn repo_path(&self) -> PinResult<std::path::PathBuf>;
}

/// Trait object [NodeClient].
pub type DynNodeClient = Arc<dyn NodeClient>;

/// A factory for creating NodeClient instances.
pub trait NodeClientFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut crate::config::Config)
        -> PinResult<()>;

    /// Construct a NodeClient instance.
    fn create(
        &self,
        builder: Arc<crate::builder::Builder>,
    ) -> PinResult<DynNodeClient>;
}

/// Trait object [NodeClientFactory].
pub type DynNodeClientFactory = Arc<dyn NodeClientFactory>;
