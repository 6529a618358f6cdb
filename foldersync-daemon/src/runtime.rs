use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use foldersync_core::ValidatedOptions;
use foldersync_sync::{CycleOutcome, CycleReport, Synchronizer};

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, CYCLE_QUEUE_DEPTH, ROTATION_CHECK_INTERVAL};
use crate::protocol::{DaemonRequest, DaemonResponse, CMD_STATUS, CMD_STOP, CMD_SYNC};

// ---------------------------------------------------------------------------
// Cycle bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Completed,
    Skipped,
}

/// Serializable record of one cycle, reported over the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub trigger: String,
    pub status: CycleStatus,
    pub copied: usize,
    pub bytes_copied: u64,
    pub unchanged: usize,
    pub vanished: usize,
    pub copy_failed: Vec<String>,
    pub deleted: usize,
    pub delete_failed: usize,
    pub pruned_dirs: usize,
    pub state_persisted: bool,
    pub duration_ms: u128,
    pub finished_at_unix: u64,
}

impl CycleSummary {
    fn from_outcome(trigger: &str, outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Completed(report) => Self::completed(trigger, report),
            CycleOutcome::Skipped => Self {
                trigger: trigger.to_string(),
                status: CycleStatus::Skipped,
                copied: 0,
                bytes_copied: 0,
                unchanged: 0,
                vanished: 0,
                copy_failed: Vec::new(),
                deleted: 0,
                delete_failed: 0,
                pruned_dirs: 0,
                state_persisted: false,
                duration_ms: 0,
                finished_at_unix: unix_seconds_now(),
            },
        }
    }

    fn completed(trigger: &str, report: CycleReport) -> Self {
        Self {
            trigger: trigger.to_string(),
            status: CycleStatus::Completed,
            copied: report.copied,
            bytes_copied: report.bytes_copied,
            unchanged: report.unchanged,
            vanished: report.vanished,
            copy_failed: report
                .copy_failed
                .iter()
                .map(|key| key.as_str().to_string())
                .collect(),
            deleted: report.deleted,
            delete_failed: report.delete_failed,
            pruned_dirs: report.pruned_dirs,
            state_persisted: report.state_persisted,
            duration_ms: report.duration.as_millis(),
            finished_at_unix: unix_seconds_now(),
        }
    }
}

/// Counters exposed by the `status` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeStats {
    pub started_at_unix: u64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycles_failed: u64,
    pub last_cycle: Option<CycleSummary>,
    pub last_error: Option<String>,
}

impl RuntimeStats {
    fn record(&mut self, outcome: &Result<CycleSummary, String>) {
        match outcome {
            Ok(summary) if summary.status == CycleStatus::Skipped => self.cycles_skipped += 1,
            Ok(summary) => {
                self.cycles_completed += 1;
                self.last_cycle = Some(summary.clone());
            }
            Err(err) => {
                self.cycles_failed += 1;
                self.last_error = Some(err.clone());
            }
        }
    }
}

type SharedStats = Arc<RwLock<RuntimeStats>>;

struct CycleJob {
    trigger: &'static str,
    respond_to: Option<oneshot::Sender<Result<CycleSummary, String>>>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Install logging, start the runtime, and block until the service stops.
pub fn start_blocking(options: ValidatedOptions) -> Result<(), DaemonError> {
    crate::logging::init(&options.log_file, options.log_level);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options))
}

/// Run the mirror service until a `stop` request or ctrl-c / SIGTERM.
///
/// A cycle runs immediately, then once per `options.interval`. Cycle
/// failures are logged and the schedule continues. On shutdown no new
/// cycle starts and an in-flight cycle runs to completion.
pub async fn run(options: ValidatedOptions) -> Result<(), DaemonError> {
    let options = Arc::new(options);
    let sync = Arc::new(Synchronizer::from_options(&options));
    let stats: SharedStats = Arc::new(RwLock::new(RuntimeStats {
        started_at_unix: unix_seconds_now(),
        ..RuntimeStats::default()
    }));

    // Bind before the first cycle so a second instance fails fast.
    let socket = socket_path(options.log_dir(), &options.source);
    prepare_socket_for_bind(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    tracing::info!(
        source = %options.source.display(),
        replica = %options.replica.display(),
        interval_ms = options.interval.as_millis() as u64,
        socket = %socket.display(),
        "foldersync started",
    );

    let (job_tx, job_rx) = mpsc::channel::<CycleJob>(CYCLE_QUEUE_DEPTH);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let sync = sync.clone();
        let stats = stats.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = cycle_processor_task(sync, stats, job_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let interval = options.interval;
        let job_tx = job_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = scheduler_task(interval, job_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = Arc::new(SocketContext {
            options: options.clone(),
            sync: sync.clone(),
            stats: stats.clone(),
            socket: socket.clone(),
            job_tx,
            shutdown_tx: shutdown.clone(),
        });
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(listener, context, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let log_file = options.log_file.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = log_rotation_task(log_file, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = shutdown_signal() => {
                    match signal {
                        Ok(name) => {
                            tracing::info!(signal = name, "received signal, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("signal handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (processor_result, scheduler_result, socket_result, rotation_result, signal_result) = tokio::join!(
        processor_handle,
        scheduler_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("cycle_processor", processor_result)?;
    handle_join("scheduler", scheduler_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;

    tracing::info!("foldersync stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Queue a timer-triggered cycle every `interval`; the first tick fires at once.
async fn scheduler_task(
    interval: std::time::Duration,
    job_tx: mpsc::Sender<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let job = CycleJob { trigger: "timer", respond_to: None };
                match job_tx.try_send(job) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("cycle queue full; dropping timer tick");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        return Err(DaemonError::ChannelClosed("cycle queue"));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Start each queued cycle without waiting for earlier ones; the
/// synchronizer's own guard turns overlapping starts into skips.
async fn cycle_processor_task(
    sync: Arc<Synchronizer>,
    stats: SharedStats,
    mut job_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                in_flight.spawn(execute_cycle(sync.clone(), stats.clone(), job));
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_cycle_join(joined);
            }
        }
    }

    if !in_flight.is_empty() {
        tracing::info!(pending = in_flight.len(), "waiting for in-flight cycle to finish");
    }
    while let Some(joined) = in_flight.join_next().await {
        log_cycle_join(joined);
    }
    Ok(())
}

async fn execute_cycle(sync: Arc<Synchronizer>, stats: SharedStats, job: CycleJob) {
    let trigger = job.trigger;
    let outcome = match tokio::task::spawn_blocking(move || sync.run_cycle()).await {
        Ok(Ok(outcome)) => Ok(CycleSummary::from_outcome(trigger, outcome)),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(format!("cycle task join error: {err}")),
    };

    match &outcome {
        Ok(summary) if summary.status == CycleStatus::Completed => tracing::debug!(
            trigger,
            copied = summary.copied,
            deleted = summary.deleted,
            duration_ms = summary.duration_ms as u64,
            "cycle finished",
        ),
        Ok(_) => tracing::debug!(trigger, "cycle skipped"),
        Err(err) => tracing::error!(trigger, error = %err, "cycle failed; continuing with next tick"),
    }

    stats.write().await.record(&outcome);
    if let Some(respond_to) = job.respond_to {
        let _ = respond_to.send(outcome);
    }
}

fn log_cycle_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "cycle task aborted");
    }
}

struct SocketContext {
    options: Arc<ValidatedOptions>,
    sync: Arc<Synchronizer>,
    stats: SharedStats,
    socket: PathBuf,
    job_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
}

async fn socket_server_task(
    listener: UnixListener,
    context: Arc<SocketContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&context.socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if context.socket.exists() {
        let _ = fs::remove_file(&context.socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    context: Arc<SocketContext>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err(&context.socket, e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            CMD_STATUS => DaemonResponse::ok(build_status_payload(&context).await),
            CMD_SYNC => match enqueue_cycle(&context.job_tx, "socket").await {
                Ok(summary) => DaemonResponse::ok(json!(summary)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            CMD_STOP => {
                let _ = context.shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(context: &SocketContext) -> Value {
    let stats = context.stats.read().await.clone();
    let options = &context.options;

    json!({
        "running": true,
        "pid": std::process::id(),
        "source": options.source.display().to_string(),
        "replica": options.replica.display().to_string(),
        "interval_ms": options.interval.as_millis() as u64,
        "log_file": options.log_file.display().to_string(),
        "state_file": context.sync.state_path().display().to_string(),
        "socket": context.socket.display().to_string(),
        "cycle_in_progress": context.sync.is_running(),
        "stats": stats,
    })
}

async fn enqueue_cycle(
    job_tx: &mpsc::Sender<CycleJob>,
    trigger: &'static str,
) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(CycleJob {
            trigger,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn log_rotation_task(
    log_file: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let log_file = log_file.clone();
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_log(&log_file))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "another foldersync instance already serves this source: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use foldersync_core::SnapshotKey;

    fn report() -> CycleReport {
        CycleReport {
            copied: 2,
            bytes_copied: 10,
            unchanged: 1,
            copy_failed: vec![SnapshotKey::from("dir/Broken.txt")],
            deleted: 1,
            duration: Duration::from_millis(42),
            ..CycleReport::default()
        }
    }

    #[test]
    fn summary_carries_report_counts() {
        let summary = CycleSummary::from_outcome("timer", CycleOutcome::Completed(report()));

        assert_eq!(summary.status, CycleStatus::Completed);
        assert_eq!(summary.copied, 2);
        assert_eq!(summary.copy_failed, vec!["dir/Broken.txt".to_string()]);
        assert_eq!(summary.duration_ms, 42);
    }

    #[test]
    fn summary_json_uses_snake_case_status() {
        let summary = CycleSummary::from_outcome("socket", CycleOutcome::Skipped);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["status"], json!("skipped"));
        assert_eq!(value["trigger"], json!("socket"));
    }

    #[test]
    fn stats_count_each_outcome_kind() {
        let mut stats = RuntimeStats::default();
        stats.record(&Ok(CycleSummary::from_outcome(
            "timer",
            CycleOutcome::Completed(report()),
        )));
        stats.record(&Ok(CycleSummary::from_outcome("timer", CycleOutcome::Skipped)));
        stats.record(&Err("source vanished".to_string()));

        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.cycles_skipped, 1);
        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(stats.last_cycle.as_ref().map(|s| s.copied), Some(2));
        assert_eq!(stats.last_error.as_deref(), Some("source vanished"));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn scheduler_ticks_immediately_then_on_interval() {
        let (job_tx, mut job_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler_task(
            Duration::from_secs(10),
            job_tx,
            shutdown_tx.subscribe(),
        ));

        let first = job_rx.recv().await.expect("immediate tick");
        assert_eq!(first.trigger, "timer");
        assert!(job_rx.try_recv().is_err(), "no second tick before the interval");

        tokio::time::advance(Duration::from_secs(10)).await;
        job_rx.recv().await.expect("tick after one interval");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn scheduler_drops_ticks_when_queue_is_full() {
        let (job_tx, mut job_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler_task(
            Duration::from_secs(1),
            job_tx,
            shutdown_tx.subscribe(),
        ));

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;

        assert!(job_rx.recv().await.is_some());
        assert!(job_rx.try_recv().is_err(), "excess ticks are dropped, not queued");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn live_socket_is_not_replaced() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("live.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();

        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(_)), "got: {err}");
        assert!(socket.exists());
    }

    #[test]
    fn stale_socket_is_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());

        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }
}
