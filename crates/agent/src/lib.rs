#![deny(missing_docs)]
//! The pinhold agent daemon.
//!
//! Wires the node client, pin engine and reporter together from a
//! [Builder], restores any persisted queue, and runs the periodic
//! reporting loop until shut down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use pinhold_api::builder::Builder;
use pinhold_api::pinner::DynPinner;
use pinhold_api::PinResult;
use pinhold_core::factories::core_pinner::{
    read_queue_snapshot, write_queue_snapshot,
};

/// Configuration for running an [Agent].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Time between reporting cycles. The first cycle runs immediately
    /// on startup.
    ///
    /// Defaults:
    /// - `testing = 100ms`
    /// - `production = 30 min`
    pub report_interval: Duration,

    /// The duration the report loop sleeps per tick while waiting for
    /// the next cycle.
    ///
    /// Setting this very high will cause ctrl-c / shutdown to be slow.
    ///
    /// Defaults:
    /// - `testing = 10ms`
    /// - `production = 250ms`
    pub tick: Duration,

    /// Where to persist queued blob ids across restarts. `None`
    /// disables queue persistence.
    ///
    /// Default:
    /// - `None`
    pub queue_file: Option<PathBuf>,
}

impl AgentConfig {
    /// Get an agent config suitable for testing.
    pub fn testing() -> Self {
        Self {
            report_interval: Duration::from_millis(100),
            tick: Duration::from_millis(10),
            queue_file: None,
        }
    }

    /// Get an agent config suitable for production.
    pub fn production() -> Self {
        Self {
            report_interval: Duration::from_secs(60 * 30),
            tick: Duration::from_millis(250),
            queue_file: None,
        }
    }
}

/// A running pinhold agent instance.
pub struct Agent {
    config: AgentConfig,
    pinner: DynPinner,
    cont: Arc<AtomicBool>,
    report_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    /// Build the modules from the builder's factories and start the
    /// reporting loop.
    pub fn new(builder: Arc<Builder>, config: AgentConfig) -> PinResult<Self> {
        let node = builder.node.create(builder.clone())?;
        let pinner = builder.pinner.create(builder.clone(), node.clone())?;
        let report =
            builder.report.create(builder.clone(), node, pinner.clone())?;

        // a queue persisted by a previous run re-enters through the
        // regular intake, so restoring is idempotent
        if let Some(path) = &config.queue_file {
            if path.exists() {
                match read_queue_snapshot(path) {
                    Ok(blob_ids) => {
                        tracing::info!(
                            count = blob_ids.len(),
                            "restoring persisted queue"
                        );
                        pinner.request_blobs(blob_ids);
                    }
                    Err(err) => {
                        tracing::warn!(?err, "could not restore queue");
                    }
                }
            }
        }

        let cont = Arc::new(AtomicBool::new(true));
        let report_thread = {
            let cont = cont.clone();
            let interval = config.report_interval;
            let tick = config.tick;
            std::thread::spawn(move || {
                while cont.load(Ordering::SeqCst) {
                    if let Err(err) = report.send_status() {
                        tracing::warn!(
                            ?err,
                            "status report failed, waiting for next cycle"
                        );
                    }

                    let cycle_start = Instant::now();
                    while cont.load(Ordering::SeqCst)
                        && cycle_start.elapsed() < interval
                    {
                        std::thread::sleep(tick);
                    }
                }
                tracing::debug!("report loop exiting");
            })
        };

        Ok(Self {
            config,
            pinner,
            cont,
            report_thread: Mutex::new(Some(report_thread)),
        })
    }

    /// The pin engine driven by this agent.
    pub fn pinner(&self) -> &DynPinner {
        &self.pinner
    }

    /// Stop the report loop, persist the queue, and shut the pin engine
    /// down. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        self.cont.store(false, Ordering::SeqCst);
        if let Some(report_thread) = self.report_thread.lock().unwrap().take()
        {
            let _ = report_thread.join();
        }

        if let Some(path) = &self.config.queue_file {
            let queued = self.pinner.queued_blobs();
            if let Err(err) = write_queue_snapshot(path, &queued) {
                tracing::warn!(?err, "could not persist queue");
            } else {
                tracing::info!(count = queued.len(), "queue persisted");
            }
        }

        self.pinner.shutdown();
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pinhold_api::node::{
        DynNodeClient, DynNodeClientFactory, MockNodeClient,
        NodeClientFactory, PinnedBlob,
    };
    use pinhold_api::{BlobId, config::Config};
    use pinhold_core::Ed25519Signer;
    use pinhold_test_utils::iter_check;
    use pinhold_test_utils::server::{CannedResponse, TestHttpServer};

    /// A node client factory handing out mocks, so the agent can be
    /// wired end to end without a storage node.
    #[derive(Debug)]
    struct StubNodeFactory {
        repo_path: PathBuf,
        fetched: Arc<Mutex<Vec<String>>>,
    }

    impl NodeClientFactory for StubNodeFactory {
        fn default_config(&self, _config: &mut Config) -> PinResult<()> {
            Ok(())
        }

        fn create(
            &self,
            _builder: Arc<Builder>,
        ) -> PinResult<DynNodeClient> {
            let repo_path = self.repo_path.clone();
            let fetched = self.fetched.clone();
            let mut node = MockNodeClient::new();
            node.expect_peer_id().returning(|| Ok("QmPeer".to_string()));
            node.expect_pinned_blobs().returning(|| {
                Ok(vec![PinnedBlob {
                    id: BlobId::from("QmPinned"),
                    size: 7,
                }])
            });
            node.expect_free_space().returning(|| Ok(1));
            node.expect_throughput().returning(|| Ok(2));
            node.expect_repo_path()
                .returning(move || Ok(repo_path.clone()));
            node.expect_fetch().returning(move |blob_id, _| {
                fetched.lock().unwrap().push(blob_id.to_string());
                Ok(())
            });
            node.expect_pin().returning(|_| Ok(()));
            let out: DynNodeClient = Arc::new(node);
            Ok(out)
        }
    }

    #[test]
    fn agent_reports_pins_and_persists_the_queue() {
        pinhold_test_utils::enable_tracing();

        let dir = tempfile::tempdir().unwrap();
        let queue_file = dir.path().join("queue");

        let server = TestHttpServer::start(vec![CannedResponse::ok(
            r#"{"pin_hash":["QmNew"],"current_timestamp":9}"#,
        )])
        .unwrap();

        let mut builder = pinhold_core::default_builder(Arc::new(
            Ed25519Signer::from_seed(&[9; 32]),
        ));
        builder.set_default_config().unwrap();
        builder.config = serde_json::from_str(&format!(
            r#"{{"report":{{"serverUrl":"{}"}}}}"#,
            server.url(),
        ))
        .unwrap();
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let node_factory: DynNodeClientFactory =
            Arc::new(StubNodeFactory {
                repo_path: dir.path().to_path_buf(),
                fetched: fetched.clone(),
            });
        builder.node = node_factory;

        let agent = Agent::new(
            builder.build(),
            AgentConfig {
                queue_file: Some(queue_file.clone()),
                ..AgentConfig::testing()
            },
        )
        .unwrap();

        // the first cycle uploads a report and the assigned blob gets
        // fetched and pinned
        iter_check!({
            if fetched.lock().unwrap().contains(&"QmNew".to_string())
                && agent.pinner().in_flight_count() == 0
            {
                break;
            }
        });
        assert!(!server.received().is_empty());

        agent.shutdown();

        // nothing was left queued, but the snapshot exists
        let persisted =
            pinhold_core::factories::core_pinner::read_queue_snapshot(
                &queue_file,
            )
            .unwrap();
        assert!(persisted.is_empty());
    }
}
