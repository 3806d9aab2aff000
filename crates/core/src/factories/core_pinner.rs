//! CorePinner is the pinhold module that downloads blobs from the
//! storage network and asks the local node to persist them, on
//! instruction from the controller.
//!
//! It consists of multiple parts:
//! - A blocking deduplicating task queue of blob ids to process
//! - Worker threads that pop tasks, download the blob and pin it
//! - An outcome thread that decides, for every completed attempt,
//!   whether to retry the task or finalize it
//!
//! ### Task queue
//!
//! A [SyncQueue] of [Task] records acts as the work queue. Intake
//! ([Pinner::request_blobs]) skips ids that are already queued and
//! counts every accepted task in the shared in-flight counter. The
//! dedup check is best-effort; a duplicate that slips through is
//! simply processed twice, with its own increment and decrement.
//!
//! ### Worker threads
//!
//! Each worker loops: pop a task, download the blob to a discard sink,
//! classify the result, pin on success, and hand the task to the
//! outcome thread. Progress callbacks from the download are throttled
//! to one log line per five percentage points. Workers exit when the
//! task queue closes.
//!
//! ### Outcome thread
//!
//! A single consumer of completed tasks, so that retry re-insertion and
//! in-flight bookkeeping cannot race each other:
//! - success: decrement in-flight
//! - permanent failure: decrement in-flight, record the failure
//! - transient failure: re-queue with an incremented timeout count, or
//!   record a failure once the retry bound is exhausted
//!
//! Whatever path a task takes, the in-flight counter is decremented
//! exactly once when it reaches a terminal disposition.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use pinhold_api::{
    builder::Builder,
    config::Config,
    node::{DynNodeClient, FetchError},
    pinner::{
        DynPinner, DynPinnerFactory, FailureCode, FailureRecord, Pinner,
        PinnerFactory,
    },
    BlobId, PinError, PinResult,
};

pub mod sync_queue;
use sync_queue::SyncQueue;

const MODULE_NAME: &str = "pinner";

/// How many transient failures a task may accumulate before it is
/// finalized as failed. The bound is fixed: three retries after the
/// initial attempt.
const MAX_TRANSIENT_FAILURES: u32 = 3;

/// Worker count bounds.
const MIN_WORKER_COUNT: usize = 1;
const MAX_WORKER_COUNT: usize = 20;

/// Download progress is logged at most once per this many percentage
/// points.
const PROGRESS_STEP_PERCENT: u64 = 5;

/// Version header of the queue snapshot file format.
const SNAPSHOT_HEADER: &str = "pinhold-queue-v1";

/// CorePinner configuration types.
pub mod config {
    /// Configuration parameters for [CorePinnerFactory](super::CorePinnerFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CorePinnerConfig {
        /// How many worker threads download and pin blobs concurrently.
        /// Clamped to [1, 20]. Default: 5.
        pub worker_count: usize,
    }

    impl Default for CorePinnerConfig {
        fn default() -> Self {
            Self { worker_count: 5 }
        }
    }

    impl pinhold_api::config::ModConfig for CorePinnerConfig {}
}

pub use config::*;

/// A production-ready pin scheduling module.
#[derive(Debug)]
pub struct CorePinnerFactory {}

impl CorePinnerFactory {
    /// Construct a new CorePinnerFactory.
    pub fn create() -> DynPinnerFactory {
        Arc::new(Self {})
    }
}

impl PinnerFactory for CorePinnerFactory {
    fn default_config(&self, config: &mut Config) -> PinResult<()> {
        config.add_default_module_config::<CorePinnerConfig>(
            MODULE_NAME.into(),
        )?;
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<Builder>,
        node: DynNodeClient,
    ) -> PinResult<DynPinner> {
        let config: CorePinnerConfig =
            builder.config.get_module_config(MODULE_NAME)?;
        let out: DynPinner = Arc::new(CorePinner::spawn(config, node));
        Ok(out)
    }
}

/// The unit of work tracked by the engine.
#[derive(Debug, Clone, Eq)]
struct Task {
    blob_id: BlobId,
    timeout_count: u32,
    status: TaskStatus,
}

/// Tasks are equal by blob id alone; the dedup check must not be
/// defeated by retry bookkeeping.
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.blob_id == other.blob_id
    }
}

impl Task {
    fn new(blob_id: BlobId) -> Self {
        Self {
            blob_id,
            timeout_count: 0,
            status: TaskStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Pending,
    Success,
    TransientFailure,
    PermanentFailure,
}

#[derive(Debug, Default)]
struct State {
    in_flight: usize,
    failures: Vec<FailureRecord>,
}

/// The pin scheduling engine. See the module docs for how the parts
/// fit together.
#[derive(Debug)]
pub struct CorePinner {
    state: Arc<Mutex<State>>,
    task_queue: Arc<SyncQueue<Task>>,
    outcome_queue: Arc<SyncQueue<Task>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    outcome_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CorePinner {
    /// Spawn the worker pool and outcome thread and return the running
    /// engine.
    pub fn spawn(config: CorePinnerConfig, node: DynNodeClient) -> Self {
        let worker_count = config
            .worker_count
            .clamp(MIN_WORKER_COUNT, MAX_WORKER_COUNT);

        let state = Arc::new(Mutex::new(State::default()));
        let task_queue = Arc::new(SyncQueue::new());
        let outcome_queue = Arc::new(SyncQueue::new());

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let task_queue = task_queue.clone();
            let outcome_queue = outcome_queue.clone();
            let node = node.clone();
            workers.push(std::thread::spawn(move || {
                CorePinner::worker(task_queue, outcome_queue, node)
            }));
        }

        let outcome_thread = {
            let state = state.clone();
            let task_queue = task_queue.clone();
            let outcome_queue = outcome_queue.clone();
            std::thread::spawn(move || {
                CorePinner::collect_outcomes(state, task_queue, outcome_queue)
            })
        };

        Self {
            state,
            task_queue,
            outcome_queue,
            workers: Mutex::new(workers),
            outcome_thread: Mutex::new(Some(outcome_thread)),
        }
    }

    /// One worker loop: pop, execute, hand the outcome over.
    fn worker(
        task_queue: Arc<SyncQueue<Task>>,
        outcome_queue: Arc<SyncQueue<Task>>,
        node: DynNodeClient,
    ) {
        while let Some(mut task) = task_queue.pop() {
            task.status = CorePinner::execute(&task, &node);
            outcome_queue.push(task);
        }
        tracing::debug!("pin worker exiting");
    }

    /// Download and pin one blob, classifying the result.
    fn execute(task: &Task, node: &DynNodeClient) -> TaskStatus {
        let blob_id = task.blob_id.clone();
        let mut last_logged_percent = 0u64;
        let on_progress = Box::new(move |bytes_read: u64, total: Option<u64>| {
            // without a total size there is no percentage to throttle on
            let Some(total) = total else {
                return;
            };
            if total == 0 {
                return;
            }
            let percent = bytes_read * 100 / total;
            if percent >= last_logged_percent + PROGRESS_STEP_PERCENT {
                last_logged_percent = percent;
                tracing::info!(%blob_id, percent, "download progress");
            }
        });

        match node.fetch(&task.blob_id, on_progress) {
            Ok(()) => {
                // pin failure is terminal but non-blocking: the download
                // already completed, so the attempt still counts
                match node.pin(&task.blob_id) {
                    Ok(()) => {
                        tracing::info!(blob_id = %task.blob_id, "blob pinned");
                    }
                    Err(err) => {
                        tracing::warn!(
                            blob_id = %task.blob_id,
                            ?err,
                            "blob downloaded but node failed to pin it"
                        );
                    }
                }
                TaskStatus::Success
            }
            Err(FetchError::DownloadTimeout(err)) => {
                tracing::warn!(blob_id = %task.blob_id, ?err, "download timed out");
                TaskStatus::TransientFailure
            }
            Err(FetchError::ConnectionTimeout(err)) => {
                tracing::warn!(
                    blob_id = %task.blob_id,
                    ?err,
                    "storage node unreachable"
                );
                TaskStatus::PermanentFailure
            }
            Err(FetchError::Other(err)) => {
                // unclassified errors are assumed retriable
                tracing::warn!(blob_id = %task.blob_id, ?err, "download failed");
                TaskStatus::TransientFailure
            }
        }
    }

    /// The single consumer of completed tasks.
    fn collect_outcomes(
        state: Arc<Mutex<State>>,
        task_queue: Arc<SyncQueue<Task>>,
        outcome_queue: Arc<SyncQueue<Task>>,
    ) {
        while let Some(mut task) = outcome_queue.pop() {
            match task.status {
                TaskStatus::Success => {
                    CorePinner::finalize(&state, None);
                }
                TaskStatus::PermanentFailure => {
                    CorePinner::finalize(
                        &state,
                        Some(FailureRecord {
                            blob_id: task.blob_id,
                            code: FailureCode::NodeUnreachable,
                            detail: "storage node connection timed out"
                                .into(),
                        }),
                    );
                }
                TaskStatus::TransientFailure => {
                    if task.timeout_count < MAX_TRANSIENT_FAILURES {
                        task.timeout_count += 1;
                        tracing::info!(
                            blob_id = %task.blob_id,
                            attempt = task.timeout_count + 1,
                            "retrying download"
                        );
                        task.status = TaskStatus::Pending;
                        // re-enters at the tail; in-flight is unchanged
                        // because the task is still live
                        task_queue.push(task);
                    } else {
                        let detail = format!(
                            "download timed out after {} attempts",
                            task.timeout_count + 1,
                        );
                        CorePinner::finalize(
                            &state,
                            Some(FailureRecord {
                                blob_id: task.blob_id,
                                code: FailureCode::DownloadTimeout,
                                detail,
                            }),
                        );
                    }
                }
                TaskStatus::Pending => {
                    // workers always set a disposition before handing
                    // a task over
                    tracing::error!(
                        blob_id = %task.blob_id,
                        "task completed without disposition"
                    );
                    CorePinner::finalize(&state, None);
                }
            }
        }
        tracing::debug!("outcome thread exiting");
    }

    /// Move a task to its terminal disposition: decrement in-flight and
    /// record the failure, if any.
    fn finalize(state: &Arc<Mutex<State>>, failure: Option<FailureRecord>) {
        let mut lock = state.lock().unwrap();
        lock.in_flight -= 1;
        if let Some(record) = failure {
            tracing::warn!(
                blob_id = %record.blob_id,
                code = record.code as u32,
                detail = record.detail.as_str(),
                "blob failed"
            );
            lock.failures.push(record);
        }
    }

    fn shutdown_impl(&self) {
        self.task_queue.close();
        for worker in self.workers.lock().unwrap().drain(..) {
            let _ = worker.join();
        }
        self.outcome_queue.close();
        if let Some(outcome_thread) = self.outcome_thread.lock().unwrap().take()
        {
            let _ = outcome_thread.join();
        }
    }
}

impl Pinner for CorePinner {
    fn request_blobs(&self, blob_ids: Vec<BlobId>) {
        for blob_id in blob_ids {
            let task = Task::new(blob_id);
            if self.task_queue.has(&task) {
                tracing::debug!(blob_id = %task.blob_id, "blob already queued");
                continue;
            }
            // push and increment under the state lock: the outcome
            // thread's decrement also takes this lock, so a completion
            // can never be counted before its acceptance
            let mut lock = self.state.lock().unwrap();
            tracing::info!(blob_id = %task.blob_id, "blob accepted");
            self.task_queue.push(task);
            lock.in_flight += 1;
        }
    }

    fn in_flight_count(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    fn drain_failures(&self) -> Vec<FailureRecord> {
        std::mem::take(&mut self.state.lock().unwrap().failures)
    }

    fn queued_blobs(&self) -> Vec<BlobId> {
        self.task_queue
            .snapshot()
            .into_iter()
            .map(|task| task.blob_id)
            .collect()
    }

    fn shutdown(&self) {
        self.shutdown_impl();
    }
}

impl Drop for CorePinner {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

/// Write queued blob ids to a snapshot file: a version header line,
/// then one id per line.
///
/// Restoring is just feeding the ids read back through
/// [Pinner::request_blobs]; intake dedup makes that idempotent.
pub fn write_queue_snapshot(
    path: &std::path::Path,
    blob_ids: &[BlobId],
) -> PinResult<()> {
    let mut out = String::from(SNAPSHOT_HEADER);
    out.push('\n');
    for blob_id in blob_ids {
        out.push_str(blob_id.as_str());
        out.push('\n');
    }
    std::fs::write(path, out)
        .map_err(|e| PinError::other_src("write queue snapshot", e))
}

/// Read blob ids back from a snapshot file written by
/// [write_queue_snapshot]. A missing or unrecognized version header is
/// an error.
pub fn read_queue_snapshot(
    path: &std::path::Path,
) -> PinResult<Vec<BlobId>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PinError::other_src("read queue snapshot", e))?;
    let mut lines = content.lines();
    match lines.next() {
        Some(SNAPSHOT_HEADER) => (),
        _ => {
            return Err(PinError::other(
                "unrecognized queue snapshot version",
            ))
        }
    }
    Ok(lines
        .filter(|line| !line.is_empty())
        .map(BlobId::from)
        .collect())
}
