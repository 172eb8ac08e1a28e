//! Provisioning and teardown of the capture worker context.
//!
//! A worker context is an OS thread running its own current-thread tokio
//! runtime. The host owns at most one of them. It outlives any single
//! coordinator, so a restarted coordinator can re-attach to a worker that
//! is still recording.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{WorkerCommand, WorkerEvent, WorkerId, WorkerMessage};
use super::CaptureWorker;
use crate::capture::MediaBackend;
use crate::config::Config;
use crate::db::ChunkStore;
use crate::error::CaptureError;

/// Knobs a worker needs, resolved from config once.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub sample_rate: u32,
    pub flush_interval: Duration,
    pub heartbeat_interval: Duration,
    pub playback_interval: Duration,
    pub append_attempts: u32,
    pub append_backoff: Duration,
    pub filename_prefix: String,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_rate: config.capture.sample_rate,
            flush_interval: config.capture.flush_interval(),
            heartbeat_interval: config.capture.heartbeat_interval(),
            playback_interval: config.capture.playback_interval(),
            append_attempts: config.storage.append_attempts,
            append_backoff: config.storage.append_backoff(),
            filename_prefix: config.output.filename_prefix.clone(),
        }
    }
}

/// Where workers send their events. The coordinator currently attached
/// receives them; with none attached they are dropped.
#[derive(Clone, Default)]
pub struct Outbox {
    inner: Arc<Mutex<Option<UnboundedSender<WorkerMessage>>>>,
}

impl Outbox {
    pub fn attach(&self, sender: UnboundedSender<WorkerMessage>) {
        *lock(&self.inner) = Some(sender);
    }

    /// Returns `false` when nobody received the event.
    pub fn send(&self, worker: WorkerId, event: WorkerEvent) -> bool {
        let guard = lock(&self.inner);
        let Some(sender) = guard.as_ref() else {
            debug!("No coordinator attached; dropping {} from {}", event.name(), worker);
            return false;
        };
        sender.send(WorkerMessage { worker, event }).is_ok()
    }
}

struct WorkerContext {
    id: WorkerId,
    commands: UnboundedSender<WorkerCommand>,
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

pub struct WorkerHost {
    backend: Arc<dyn MediaBackend>,
    settings: WorkerSettings,
    db_path: PathBuf,
    outbox: Outbox,
    slot: Mutex<Option<WorkerContext>>,
    next_id: AtomicU64,
}

impl WorkerHost {
    pub fn new(backend: Arc<dyn MediaBackend>, settings: WorkerSettings, db_path: PathBuf) -> Self {
        Self {
            backend,
            settings,
            db_path,
            outbox: Outbox::default(),
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Route worker events to a new coordinator.
    pub fn attach(&self, events: UnboundedSender<WorkerMessage>) {
        self.outbox.attach(events);
    }

    /// Whether a worker context is alive right now.
    pub fn exists(&self) -> bool {
        self.live_worker().is_some()
    }

    /// Id of the context in the slot, alive or not.
    pub fn current(&self) -> Option<WorkerId> {
        lock(&self.slot).as_ref().map(|ctx| ctx.id)
    }

    /// Id of the context in the slot if its thread is still running.
    pub fn live_worker(&self) -> Option<WorkerId> {
        lock(&self.slot)
            .as_ref()
            .filter(|ctx| !ctx.thread.is_finished())
            .map(|ctx| ctx.id)
    }

    /// Provision a fresh worker context. The slot must be empty or hold a
    /// finished context; callers close the previous worker first.
    pub fn create(&self) -> Result<WorkerId, CaptureError> {
        let mut slot = lock(&self.slot);
        if let Some(existing) = slot.as_ref() {
            if !existing.thread.is_finished() {
                return Err(CaptureError::Provisioning(format!(
                    "{} is still running",
                    existing.id
                )));
            }
        }

        let id = WorkerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let store = ChunkStore::open(&self.db_path)
            .map_err(|e| CaptureError::Storage(format!("{e:#}")))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();
        let outbox = self.outbox.clone();
        let worker_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", id.0))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to build runtime for {}: {}", id, e);
                        return;
                    }
                };

                let worker = CaptureWorker::new(
                    id,
                    backend,
                    store,
                    settings,
                    outbox,
                    command_rx,
                    worker_cancel,
                );
                runtime.block_on(worker.run());
            })
            .map_err(|e| CaptureError::Provisioning(format!("failed to spawn worker thread: {e}")))?;

        info!("Provisioned capture worker {}", id);
        *slot = Some(WorkerContext {
            id,
            commands,
            cancel,
            thread,
        });
        Ok(id)
    }

    pub fn send(&self, command: WorkerCommand) -> Result<(), CaptureError> {
        let slot = lock(&self.slot);
        let ctx = slot
            .as_ref()
            .ok_or_else(|| CaptureError::Pipeline("no worker context".to_string()))?;
        ctx.commands
            .send(command)
            .map_err(|_| CaptureError::Pipeline(format!("{} is no longer listening", ctx.id)))
    }

    /// Cancel the worker in the slot and wait for its thread to exit.
    pub async fn close(&self) {
        let Some(ctx) = lock(&self.slot).take() else {
            return;
        };
        let WorkerContext {
            id,
            commands,
            cancel,
            thread,
        } = ctx;

        debug!("Closing capture worker {}", id);
        cancel.cancel();
        drop(commands);

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => info!("Capture worker {} closed", id),
            Ok(Err(_)) => error!("Capture worker {} panicked", id),
            Err(e) => warn!("Failed to join capture worker {}: {}", id, e),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
