//! Controller status reporting types.
//!
//! Once per reporting cycle the agent uploads a signed status report to
//! the remote controller and receives the next batch of blob ids to
//! fetch in return.

use crate::{BlobId, DynNodeClient, DynPinner, FailureRecord, PinResult,
    PinnedBlob};
use std::sync::Arc;

/// The status payload uploaded to the controller.
///
/// Field names are the controller protocol's wire names.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusReport {
    /// The storage node's peer identity.
    pub node_external_id: String,

    /// Everything currently pinned, with cumulative sizes.
    pub pinned_files: Vec<PinnedBlob>,

    /// Count of blobs accepted but not yet resolved.
    pub pinning_file_size: u64,

    /// Bytes still available to the node's repository.
    pub available_space: u64,

    /// Total bytes the node has sent since it started.
    pub throughput: u64,

    /// The timestamp the controller handed out on the previous cycle,
    /// `0` when reporting for the first time.
    pub last_timestamp: u64,

    /// Blobs that reached a terminal failure since the last report.
    pub fail_list: Vec<FailureRecord>,
}

/// A signed envelope wrapping a status report.
///
/// The signature covers the exact serialized bytes of `data`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SignedReport {
    /// The status payload.
    pub data: StatusReport,

    /// Base64 encoded detached signature over the serialized payload.
    pub signature: String,

    /// Base64 encoded public key of the signing agent.
    #[serde(rename = "publickey")]
    pub public_key: String,
}

/// The controller's answer to a status report.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ControllerResponse {
    /// The next batch of blob ids this agent should fetch and pin.
    #[serde(default)]
    pub pin_hash: Vec<BlobId>,

    /// Timestamp to echo back as `last_timestamp` on the next cycle.
    #[serde(default)]
    pub current_timestamp: u64,
}

/// Trait for implementing the controller reporting module.
pub trait Report: 'static + Send + Sync + std::fmt::Debug {
    /// Run one reporting cycle: gather and sign the status report,
    /// upload it, and feed the blob ids the controller assigns back into
    /// the pin engine. Any step failing aborts the cycle with an error;
    /// the caller is expected to log it and wait for the next cycle.
    fn send_status(&self) -> PinResult<()>;
}

/// Trait object [Report].
pub type DynReport = Arc<dyn Report>;

/// A factory for creating Report instances.
pub trait ReportFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut crate::config::Config)
        -> PinResult<()>;

    /// Construct a Report instance.
    fn create(
        &self,
        builder: Arc<crate::builder::Builder>,
        node: DynNodeClient,
        pinner: DynPinner,
    ) -> PinResult<DynReport>;
}

/// Trait object [ReportFactory].
pub type DynReportFactory = Arc<dyn ReportFactory>;
