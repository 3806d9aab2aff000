//! HttpReport is the [Report] implementation that uploads signed status
//! reports to the remote controller and feeds the blob ids the
//! controller assigns back into the pin engine.
//!
//! One cycle:
//! - gather the status payload from the node client and the pin engine
//!   (this drains the accumulated failure records)
//! - sign the exact serialized payload bytes
//! - post the signed envelope to the controller
//! - persist the timestamp the controller hands back, to be echoed on
//!   the next cycle
//! - enqueue the assigned blob ids

use std::sync::Arc;
use std::time::Duration;

use pinhold_api::{
    builder::Builder,
    config::Config,
    node::DynNodeClient,
    pinner::DynPinner,
    report::{
        ControllerResponse, DynReport, DynReportFactory, Report,
        ReportFactory, SignedReport, StatusReport,
    },
    signer::DynSigner,
    PinError, PinResult,
};

use base64::prelude::*;

const MODULE_NAME: &str = "report";

/// File under the node repo path holding the controller timestamp.
const TIMESTAMP_FILE: &str = "monitor_timestamp";

/// HttpReport configuration types.
pub mod config {
    /// Configuration parameters for [HttpReportFactory](super::HttpReportFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct HttpReportConfig {
        /// Url the signed status reports are posted to.
        /// Default: "http://127.0.0.1:8080/monitor/report".
        pub server_url: String,

        /// Overall timeout for the upload in milliseconds.
        /// Default: 60 000.
        pub request_timeout_ms: u64,
    }

    impl Default for HttpReportConfig {
        fn default() -> Self {
            Self {
                server_url: "http://127.0.0.1:8080/monitor/report".into(),
                request_timeout_ms: 60_000,
            }
        }
    }

    impl pinhold_api::config::ModConfig for HttpReportConfig {}
}

pub use config::*;

/// A production-ready controller reporting module.
#[derive(Debug)]
pub struct HttpReportFactory {}

impl HttpReportFactory {
    /// Construct a new HttpReportFactory.
    pub fn create() -> DynReportFactory {
        Arc::new(Self {})
    }
}

impl ReportFactory for HttpReportFactory {
    fn default_config(&self, config: &mut Config) -> PinResult<()> {
        config.add_default_module_config::<HttpReportConfig>(
            MODULE_NAME.into(),
        )?;
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<Builder>,
        node: DynNodeClient,
        pinner: DynPinner,
    ) -> PinResult<DynReport> {
        let config: HttpReportConfig =
            builder.config.get_module_config(MODULE_NAME)?;
        let out: DynReport = Arc::new(HttpReport::new(
            config,
            builder.signer.clone(),
            node,
            pinner,
        ));
        Ok(out)
    }
}

/// [Report] posting signed status reports over http.
pub struct HttpReport {
    config: HttpReportConfig,
    agent: ureq::Agent,
    signer: DynSigner,
    node: DynNodeClient,
    pinner: DynPinner,
}

impl std::fmt::Debug for HttpReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReport")
            .field("server_url", &self.config.server_url)
            .finish()
    }
}

impl HttpReport {
    /// Construct a new HttpReport.
    pub fn new(
        config: HttpReportConfig,
        signer: DynSigner,
        node: DynNodeClient,
        pinner: DynPinner,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build();
        Self {
            config,
            agent,
            signer,
            node,
            pinner,
        }
    }

    /// Assemble the status payload. Draining the failure records here
    /// means a cycle that fails after this point loses them; the
    /// controller protocol treats the records as delivered at read time.
    fn gather(&self) -> PinResult<StatusReport> {
        let node_external_id = self.node.peer_id()?;
        let pinned_files = self.node.pinned_blobs()?;
        let pinning_file_size = self.pinner.in_flight_count() as u64;
        let available_space = self.node.free_space()?;
        let throughput = self.node.throughput()?;
        let last_timestamp = self.read_last_timestamp()?;
        let fail_list = self.pinner.drain_failures();

        Ok(StatusReport {
            node_external_id,
            pinned_files,
            pinning_file_size,
            available_space,
            throughput,
            last_timestamp,
            fail_list,
        })
    }

    fn timestamp_path(&self) -> PinResult<std::path::PathBuf> {
        Ok(self.node.repo_path()?.join(TIMESTAMP_FILE))
    }

    fn read_last_timestamp(&self) -> PinResult<u64> {
        let path = self.timestamp_path()?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(0);
            }
            Err(err) => {
                return Err(PinError::other_src("read timestamp", err));
            }
        };
        Ok(content.trim().parse().unwrap_or(0))
    }

    fn write_last_timestamp(&self, timestamp: u64) -> PinResult<()> {
        let path = self.timestamp_path()?;
        std::fs::write(&path, timestamp.to_string())
            .map_err(|err| PinError::other_src("write timestamp", err))
    }
}

impl Report for HttpReport {
    fn send_status(&self) -> PinResult<()> {
        let report = self.gather()?;

        let payload = serde_json::to_vec(&report)
            .map_err(|err| PinError::other_src("encode status report", err))?;
        let signature = self.signer.sign(&payload)?;

        let envelope = SignedReport {
            data: report,
            signature: BASE64_STANDARD.encode(signature),
            public_key: self.signer.public_key(),
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|err| PinError::other_src("encode signed report", err))?;

        tracing::debug!(
            url = self.config.server_url.as_str(),
            bytes = body.len(),
            "uploading status report"
        );
        let response: ControllerResponse = self
            .agent
            .post(&self.config.server_url)
            .set("Content-Type", "application/json")
            .send_bytes(&body)
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => {
                    PinError::status("post status report", status)
                }
                ureq::Error::Transport(err) => {
                    PinError::other_src("post status report", err)
                }
            })?
            .into_json()
            .map_err(|err| {
                PinError::other_src("decode controller response", err)
            })?;

        self.write_last_timestamp(response.current_timestamp)?;

        tracing::info!(
            assigned = response.pin_hash.len(),
            "controller assigned blobs"
        );
        self.pinner.request_blobs(response.pin_hash);

        Ok(())
    }
}
