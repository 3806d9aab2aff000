//! HttpNode is a [NodeClient] implementation speaking the storage
//! node's local http rpc api.
//!
//! All calls are plain blocking requests. Two http agents are held: one
//! with an overall timeout for control requests, and one with a read
//! timeout for streamed blob downloads, so that a large transfer is
//! bounded by progress rather than total duration.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use pinhold_api::{
    builder::Builder,
    config::Config,
    node::{
        DynNodeClient, DynNodeClientFactory, FetchError, NodeClient,
        NodeClientFactory, PinnedBlob, ProgressCb,
    },
    BlobId, PinError, PinResult,
};

const MODULE_NAME: &str = "node";

/// Blob downloads are streamed to the discard sink in reads of this
/// size.
const STREAM_CHUNK_SIZE: usize = 128 * 1024;

/// HttpNode configuration types.
pub mod config {
    /// Configuration parameters for [HttpNodeFactory](super::HttpNodeFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct HttpNodeConfig {
        /// Base url of the storage node rpc api.
        /// Default: "http://127.0.0.1:5001".
        pub base_url: String,

        /// Overall timeout for control requests in milliseconds.
        /// Default: 60 000.
        pub request_timeout_ms: u64,

        /// Read timeout while streaming blob bytes in milliseconds.
        /// Default: 180 000.
        pub stream_read_timeout_ms: u64,
    }

    impl Default for HttpNodeConfig {
        fn default() -> Self {
            Self {
                base_url: "http://127.0.0.1:5001".into(),
                request_timeout_ms: 60_000,
                stream_read_timeout_ms: 180_000,
            }
        }
    }

    impl pinhold_api::config::ModConfig for HttpNodeConfig {}
}

pub use config::*;

/// A production-ready storage node client module.
#[derive(Debug)]
pub struct HttpNodeFactory {}

impl HttpNodeFactory {
    /// Construct a new HttpNodeFactory.
    pub fn create() -> DynNodeClientFactory {
        Arc::new(Self {})
    }
}

impl NodeClientFactory for HttpNodeFactory {
    fn default_config(&self, config: &mut Config) -> PinResult<()> {
        config
            .add_default_module_config::<HttpNodeConfig>(MODULE_NAME.into())?;
        Ok(())
    }

    fn create(&self, builder: Arc<Builder>) -> PinResult<DynNodeClient> {
        let config: HttpNodeConfig =
            builder.config.get_module_config(MODULE_NAME)?;
        let out: DynNodeClient = Arc::new(HttpNode::new(config));
        Ok(out)
    }
}

// response shapes of the node rpc api

#[derive(Debug, serde::Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, serde::Deserialize)]
struct RepoStatResponse {
    #[serde(rename = "RepoSize")]
    repo_size: u64,
    #[serde(rename = "StorageMax")]
    storage_max: u64,
    #[serde(rename = "RepoPath")]
    repo_path: String,
}

#[derive(Debug, serde::Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct ObjectResponse {
    #[serde(rename = "Links", default)]
    links: Vec<ObjectLink>,
    #[serde(rename = "Data", default)]
    data: String,
}

#[derive(Debug, serde::Deserialize)]
struct ObjectLink {
    #[serde(rename = "Size", default)]
    size: u64,
}

#[derive(Debug, serde::Deserialize)]
struct BandwidthResponse {
    #[serde(rename = "TotalOut")]
    total_out: u64,
}

#[derive(Debug, serde::Deserialize)]
struct PinAddResponse {
    #[serde(rename = "Pins", default)]
    _pins: Vec<String>,
}

/// [NodeClient] speaking the storage node's http rpc api.
pub struct HttpNode {
    base_url: String,
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
}

impl std::fmt::Debug for HttpNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNode")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpNode {
    /// Construct a new HttpNode from config.
    pub fn new(config: HttpNodeConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build();
        let stream_agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.request_timeout_ms))
            .timeout_read(Duration::from_millis(config.stream_read_timeout_ms))
            .build();
        Self {
            base_url: config.base_url,
            agent,
            stream_agent,
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &str,
        path: &str,
    ) -> PinResult<T> {
        self.agent
            .get(&format!("{}{}", self.base_url, path))
            .call()
            .map_err(|err| request_error(ctx, err))?
            .into_json()
            .map_err(|err| PinError::other_src(ctx, err))
    }

    fn repo_stat(&self) -> PinResult<RepoStatResponse> {
        self.get_json("get repo stat", "/api/v0/repo/stat")
    }

    /// Cumulative size of a blob: the sum of its link sizes, falling
    /// back to its own data length for leaf blobs.
    fn blob_size(&self, blob_id: &str) -> PinResult<u64> {
        let object: ObjectResponse = self.get_json(
            "get object",
            &format!("/api/v0/object/get?arg={blob_id}"),
        )?;
        let mut size: u64 = object.links.iter().map(|link| link.size).sum();
        if size == 0 {
            size = object.data.len() as u64;
        }
        Ok(size)
    }
}

impl NodeClient for HttpNode {
    fn peer_id(&self) -> PinResult<String> {
        let result: IdResponse = self.get_json("get peer id", "/api/v0/id")?;
        Ok(result.id)
    }

    fn fetch(
        &self,
        blob_id: &BlobId,
        mut on_progress: ProgressCb,
    ) -> Result<(), FetchError> {
        let response = self
            .stream_agent
            .get(&format!("{}/api/v0/get?arg={}", self.base_url, blob_id))
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => FetchError::Other(
                    PinError::status("fetch blob", status),
                ),
                ureq::Error::Transport(err) => FetchError::ConnectionTimeout(
                    PinError::other_src("fetch blob", err),
                ),
            })?;

        let total = response
            .header("X-Content-Length")
            .and_then(|value| value.parse::<u64>().ok());

        let mut reader = response.into_reader();
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let mut bytes_read = 0u64;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    bytes_read += read as u64;
                    on_progress(bytes_read, total);
                }
                Err(err) => {
                    return Err(FetchError::DownloadTimeout(
                        PinError::other_src("blob download interrupted", err),
                    ));
                }
            }
        }

        Ok(())
    }

    fn pin(&self, blob_id: &BlobId) -> PinResult<()> {
        let _result: PinAddResponse = self.get_json(
            "pin blob",
            &format!("/api/v0/pin/add?arg={blob_id}&recursive=true&progress=false"),
        )?;
        Ok(())
    }

    fn pinned_blobs(&self) -> PinResult<Vec<PinnedBlob>> {
        let result: PinLsResponse = self
            .get_json("get pinned blobs", "/api/v0/pin/ls?type=recursive")?;
        let mut out = Vec::with_capacity(result.keys.len());
        for blob_id in result.keys.keys() {
            let size = self.blob_size(blob_id)?;
            out.push(PinnedBlob {
                id: BlobId::from(blob_id.as_str()),
                size,
            });
        }
        Ok(out)
    }

    fn free_space(&self) -> PinResult<u64> {
        let stat = self.repo_stat()?;
        Ok(stat.storage_max.saturating_sub(stat.repo_size))
    }

    fn throughput(&self) -> PinResult<u64> {
        let result: BandwidthResponse =
            self.get_json("get throughput", "/api/v0/stats/bw")?;
        Ok(result.total_out)
    }

    fn repo_path(&self) -> PinResult<std::path::PathBuf> {
        let stat = self.repo_stat()?;
        Ok(stat.repo_path.into())
    }
}

fn request_error(ctx: &str, err: ureq::Error) -> PinError {
    match err {
        ureq::Error::Status(status, _) => PinError::status(ctx, status),
        ureq::Error::Transport(err) => PinError::other_src(ctx, err),
    }
}
