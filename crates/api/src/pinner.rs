//! Pin scheduling types.

use crate::{BlobId, DynNodeClient, PinResult};
use std::sync::Arc;

/// Classifies why a blob reached a terminal failure.
///
/// Serialized as the numeric code the controller protocol expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    /// The storage node connection timed out before the transfer could
    /// start. Recorded without any retry.
    NodeUnreachable = 1,

    /// Every download attempt timed out and the retry bound was
    /// exhausted.
    DownloadTimeout = 2,
}

impl serde::Serialize for FailureCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> serde::Deserialize<'de> for FailureCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u32::deserialize(deserializer)? {
            1 => Ok(FailureCode::NodeUnreachable),
            2 => Ok(FailureCode::DownloadTimeout),
            code => Err(serde::de::Error::custom(format!(
                "unknown failure code: {code}"
            ))),
        }
    }
}

/// Record of a blob that could not be downloaded and pinned.
///
/// Accumulated by the engine and handed to the reporting collaborator
/// through [Pinner::drain_failures].
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct FailureRecord {
    /// The blob's content identifier.
    pub blob_id: BlobId,

    /// The failure classification.
    pub code: FailureCode,

    /// Human-readable cause.
    pub detail: String,
}

/// Trait for implementing the pin scheduling engine: a deduplicating
/// task queue feeding a bounded pool of workers that download and pin
/// blobs, retrying transient failures up to a bound.
pub trait Pinner: 'static + Send + Sync + std::fmt::Debug {
    /// Queue a batch of blob ids for download + pin. Ids already waiting
    /// in the queue are silently skipped; no error is ever raised.
    fn request_blobs(&self, blob_ids: Vec<BlobId>);

    /// Number of blobs accepted but not yet resolved (queued or
    /// currently held by a worker). Eventually-consistent snapshot.
    fn in_flight_count(&self) -> usize;

    /// Return and clear the accumulated failure records. Single consumer
    /// assumed.
    fn drain_failures(&self) -> Vec<FailureRecord>;

    /// Snapshot of the ids currently waiting in the queue. Does not
    /// include blobs currently held by a worker.
    fn queued_blobs(&self) -> Vec<BlobId>;

    /// Close the queue and wait for workers to finish their current
    /// attempt. Idempotent.
    fn shutdown(&self);
}

/// Trait object [Pinner].
pub type DynPinner = Arc<dyn Pinner>;

/// A factory for creating Pinner instances.
pub trait PinnerFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut crate::config::Config)
        -> PinResult<()>;

    /// Construct a Pinner instance.
    fn create(
        &self,
        builder: Arc<crate::builder::Builder>,
        node: DynNodeClient,
    ) -> PinResult<DynPinner>;
}

/// Trait object [PinnerFactory].
pub type DynPinnerFactory = Arc<dyn PinnerFactory>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failure_record_serde_uses_numeric_codes() {
        let record = FailureRecord {
            blob_id: BlobId::from("QmMissing"),
            code: FailureCode::DownloadTimeout,
            detail: "download timed out after 4 attempts".into(),
        };
        let enc = serde_json::to_string(&record).unwrap();
        assert_eq!(
            r#"{"blob_id":"QmMissing","code":2,"detail":"download timed out after 4 attempts"}"#,
            enc.as_str(),
        );
        let dec: FailureRecord = serde_json::from_str(&enc).unwrap();
        assert_eq!(record, dec);
    }

    #[test]
    fn unknown_failure_code_is_rejected() {
        assert!(serde_json::from_str::<FailureCode>("3").is_err());
    }
}
