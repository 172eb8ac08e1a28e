//! The capture worker: owns the audio streams, the encoder, and the chunk
//! store connection for one recording.
//!
//! It never holds more than one flush window of audio: every window is mixed,
//! encoded, appended to the chunk store, and dropped.

pub mod host;
pub mod liveness;
pub mod messages;
pub mod pipeline;

pub use host::{Outbox, WorkerHost, WorkerSettings};
pub use liveness::LivenessMonitor;
pub use messages::{WorkerCommand, WorkerEvent, WorkerId, WorkerMessage};
pub use pipeline::MixPipeline;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::{self, Artifact};
use crate::capture::{CaptureHandle, MediaBackend};
use crate::db::ChunkStore;
use crate::error::{CaptureError, FailureKind, FailureReason};

pub struct CaptureWorker {
    id: WorkerId,
    backend: Arc<dyn MediaBackend>,
    store: ChunkStore,
    settings: WorkerSettings,
    outbox: Outbox,
    commands: UnboundedReceiver<WorkerCommand>,
    cancel: CancellationToken,
    pipeline: Option<MixPipeline>,
    /// Set once an `Initialize` arrived, whether or not capture opened.
    initialized: bool,
    chunks_written: u64,
}

impl CaptureWorker {
    pub fn new(
        id: WorkerId,
        backend: Arc<dyn MediaBackend>,
        store: ChunkStore,
        settings: WorkerSettings,
        outbox: Outbox,
        commands: UnboundedReceiver<WorkerCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            backend,
            store,
            settings,
            outbox,
            commands,
            cancel,
            pipeline: None,
            initialized: false,
            chunks_written: 0,
        }
    }

    /// Run until cancelled or until the command channel closes.
    pub async fn run(mut self) {
        info!("Capture worker {} ready", self.id);
        self.emit(WorkerEvent::Ready);

        let mut flush = ticker(self.settings.flush_interval);
        let mut heartbeat = ticker(self.settings.heartbeat_interval);
        let mut playback = ticker(self.settings.playback_interval);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Capture worker {} cancelled", self.id);
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(WorkerCommand::Initialize(handle)) => {
                        if self.initialize(handle) {
                            flush.reset();
                            heartbeat.reset();
                            playback.reset();
                        }
                    }
                    Some(WorkerCommand::Finalize) => self.finalize().await,
                    None => {
                        debug!("Command channel for {} closed", self.id);
                        break;
                    }
                },
                _ = flush.tick(), if self.pipeline.is_some() => {
                    if let Err(e) = self.flush().await {
                        self.fail(e);
                    }
                }
                _ = heartbeat.tick(), if self.pipeline.is_some() => {
                    self.emit(WorkerEvent::Heartbeat);
                }
                _ = playback.tick(), if self.pipeline.as_ref().is_some_and(MixPipeline::has_playback) => {
                    if let Err(e) = self.pump() {
                        self.fail(e);
                    }
                }
            }
        }

        self.shutdown();
        info!("Capture worker {} exited", self.id);
    }

    /// Returns whether capture started.
    fn initialize(&mut self, handle: CaptureHandle) -> bool {
        if self.pipeline.is_some() {
            warn!("Capture worker {} already initialized; ignoring", self.id);
            return false;
        }
        self.initialized = true;

        match self.open_pipeline(handle) {
            Ok(pipeline) => {
                self.pipeline = Some(pipeline);
                self.chunks_written = 0;
                info!("Capture worker {} recording", self.id);
                self.emit(WorkerEvent::Started {
                    started_at: Utc::now(),
                });
                true
            }
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    fn open_pipeline(&mut self, handle: CaptureHandle) -> Result<MixPipeline, CaptureError> {
        // Leftovers from a session that never finalized
        let stale = self.store.clear().map_err(|e| CaptureError::Storage(format!("{e:#}")))?;
        if stale > 0 {
            warn!("Discarded {} chunks left over from a previous session", stale);
        }

        handle.validate(Utc::now())?;
        info!(
            "Capture handle {} accepted for {:?}",
            handle.token(),
            handle.device_name()
        );

        let monitor = self.backend.open_monitor(&handle)?;
        let mic = self.backend.open_microphone()?;
        let playback = self.backend.open_playback().unwrap_or_else(|e| {
            warn!("Continuing without loopback playback: {}", e);
            None
        });

        let mut pipeline = MixPipeline::new(monitor, mic, playback, self.settings.sample_rate)?;
        pipeline.start()?;
        Ok(pipeline)
    }

    fn pump(&mut self) -> Result<(), CaptureError> {
        match self.pipeline.as_mut() {
            Some(pipeline) => pipeline.pump(),
            None => Ok(()),
        }
    }

    async fn flush(&mut self) -> Result<(), CaptureError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        let Some(payload) = pipeline.flush()? else {
            debug!("Empty flush window; no chunk written");
            return Ok(());
        };

        let sequence = self
            .store
            .append_with_retry(
                &payload,
                self.settings.append_attempts,
                self.settings.append_backoff,
            )
            .await
            .map_err(|e| CaptureError::Storage(format!("{e:#}")))?;

        self.chunks_written += 1;
        debug!(
            "Chunk {} stored ({} bytes, {} this session)",
            sequence,
            payload.len(),
            self.chunks_written
        );
        Ok(())
    }

    async fn finalize(&mut self) {
        if self.pipeline.is_none() {
            if self.initialized {
                debug!("Finalize on {} after the session ended; ignoring", self.id);
            } else {
                // The sender waits for either ArtifactReady or Failed
                warn!("Finalize on {} before any capture handle arrived", self.id);
                self.emit(WorkerEvent::Failed(FailureReason::new(
                    FailureKind::Pipeline,
                    "finalize requested before capture was initialized",
                )));
            }
            return;
        }

        match self.assemble().await {
            Ok(artifact) => {
                info!(
                    "Capture worker {} finalized {} ({} bytes)",
                    self.id,
                    artifact.suggested_name,
                    artifact.size()
                );
                self.emit(WorkerEvent::ArtifactReady(artifact));
            }
            Err(e) => self.fail(e),
        }
    }

    async fn assemble(&mut self) -> Result<Artifact, CaptureError> {
        self.flush().await?;
        self.release();
        artifact::assemble(&self.store, &self.settings.filename_prefix, Utc::now())
    }

    fn fail(&mut self, err: CaptureError) {
        error!("Capture worker {} failed: {}", self.id, err);
        self.release();
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear chunk store after failure: {:#}", e);
        }
        self.emit(WorkerEvent::Failed(FailureReason::from(&err)));
    }

    fn release(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
    }

    /// Torn down mid-recording: the session will never finalize.
    fn shutdown(&mut self) {
        if self.pipeline.is_some() {
            self.release();
            if let Err(e) = self.store.clear() {
                warn!("Failed to clear chunk store on shutdown: {:#}", e);
            }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        self.outbox.send(self.id, event);
    }
}

fn ticker(period: std::time::Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
