//! The lifecycle coordinator.
//!
//! A single tokio task owns the session state. Front-end requests and worker
//! events both arrive as messages and are handled one at a time, so a
//! `Ready` that races a `start` is only seen once the handle is stored.

pub mod messages;
pub mod session;

pub use messages::{CoordinatorRequest, StartRequest, StartResponse, StatusResponse, StopResponse};
pub use session::{SessionEvent, SessionPhase, SessionState};

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::{Artifact, ArtifactSink};
use crate::capture::CaptureHandleProvider;
use crate::config::Config;
use crate::db::{PersistedStatus, StatusStore};
use crate::error::{CaptureError, FailureKind, FailureReason};
use crate::worker::{LivenessMonitor, WorkerCommand, WorkerEvent, WorkerHost, WorkerId, WorkerMessage};

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub teardown_grace: Duration,
    pub staleness_threshold: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            teardown_grace: config.coordinator.teardown_grace(),
            staleness_threshold: config.coordinator.staleness_threshold(),
        }
    }
}

/// Cheap, cloneable way to talk to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    requests: UnboundedSender<CoordinatorRequest>,
}

impl CoordinatorHandle {
    pub async fn start(&self, target_id: impl Into<String>) -> Result<StartResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorRequest::Start {
            target_id: target_id.into(),
            reply,
        })?;
        rx.await.map_err(|_| anyhow!("Coordinator dropped the start request"))
    }

    pub async fn stop(&self) -> Result<StopResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorRequest::Stop { reply })?;
        rx.await.map_err(|_| anyhow!("Coordinator dropped the stop request"))
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorRequest::Status { reply })?;
        rx.await.map_err(|_| anyhow!("Coordinator dropped the status request"))
    }

    fn send(&self, request: CoordinatorRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| anyhow!("Coordinator is not running"))
    }
}

struct PendingTeardown {
    worker: WorkerId,
    cancel: CancellationToken,
}

pub struct Coordinator {
    host: Arc<WorkerHost>,
    provider: Arc<dyn CaptureHandleProvider>,
    sink: Arc<dyn ArtifactSink>,
    status_store: StatusStore,
    settings: CoordinatorSettings,
    session: SessionState,
    liveness: LivenessMonitor,
    teardown: Option<PendingTeardown>,
    timers: UnboundedSender<WorkerId>,
}

impl Coordinator {
    /// Spawn the coordinator task and attach it to the host's worker events.
    ///
    /// The task runs until every `CoordinatorHandle` is dropped. Spawning a
    /// new coordinator against the same host re-attaches to a surviving worker.
    pub fn spawn(
        host: Arc<WorkerHost>,
        provider: Arc<dyn CaptureHandleProvider>,
        sink: Arc<dyn ArtifactSink>,
        status_store: StatusStore,
        settings: CoordinatorSettings,
    ) -> CoordinatorHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();

        host.attach(events_tx);

        let mut coordinator = Self {
            host,
            provider,
            sink,
            status_store,
            settings,
            session: SessionState::default(),
            liveness: LivenessMonitor::default(),
            teardown: None,
            timers: timers_tx,
        };
        coordinator.rediscover();

        tokio::spawn(coordinator.run(requests_rx, events_rx, timers_rx));

        CoordinatorHandle {
            requests: requests_tx,
        }
    }

    async fn run(
        mut self,
        mut requests: UnboundedReceiver<CoordinatorRequest>,
        mut events: UnboundedReceiver<WorkerMessage>,
        mut timers: UnboundedReceiver<WorkerId>,
    ) {
        info!("Coordinator running");
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(message) = events.recv() => self.handle_worker_message(message).await,
                Some(worker) = timers.recv() => self.on_teardown_due(worker).await,
            }
        }

        self.cancel_teardown();
        info!("Coordinator stopped");
    }

    fn rediscover(&mut self) {
        let Some(worker) = self.host.live_worker() else {
            return;
        };

        let persisted = self.load_persisted();
        let recording = persisted.map(|p| p.is_recording).unwrap_or(true);
        info!(
            "Re-attached to surviving capture worker {} (recording: {})",
            worker, recording
        );
        self.session.apply(SessionEvent::Rediscovered {
            worker,
            start_time: persisted.and_then(|p| p.start_time),
            recording,
        });
    }

    async fn handle_request(&mut self, request: CoordinatorRequest) {
        match request {
            CoordinatorRequest::Start { target_id, reply } => {
                let response = self.start(target_id).await;
                let _ = reply.send(response);
            }
            CoordinatorRequest::Stop { reply } => {
                let response = self.stop();
                let _ = reply.send(response);
            }
            CoordinatorRequest::Status { reply } => {
                let response = self.status();
                let _ = reply.send(response);
            }
        }
    }

    async fn start(&mut self, target_id: String) -> StartResponse {
        info!("Start requested for target {:?}", target_id);
        self.cancel_teardown();

        if self.host.current().is_some() || !self.session.is_idle() {
            info!("Tearing down previous worker context before starting");
            self.teardown_now().await;
        }

        match self.provision(target_id).await {
            Ok(worker) => {
                info!("Recording starting on {}", worker);
                StartResponse::ok()
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.session.last_error = Some(e.to_string());
                StartResponse::failed(e)
            }
        }
    }

    async fn provision(&mut self, target_id: String) -> Result<WorkerId, CaptureError> {
        let handle = self.provider.acquire(&target_id).await?;
        let worker = self.host.create()?;

        let start_time = Utc::now().timestamp_millis();
        let saved = self.status_store.save(&PersistedStatus::recording(start_time));
        if let Err(e) = saved {
            self.host.close().await;
            return Err(CaptureError::Storage(format!("{e:#}")));
        }

        self.liveness.reset();
        self.session.apply(SessionEvent::StartRequested {
            target_id,
            worker,
            handle,
            start_time,
        });
        Ok(worker)
    }

    fn stop(&mut self) -> StopResponse {
        if !self.host.exists() {
            if self.host.current().is_some() {
                // Thread already gone; finish the bookkeeping
                self.schedule_teardown(Duration::ZERO);
            }
            debug!("Stop requested with no worker context; nothing to do");
            return StopResponse { success: true };
        }

        let phase = self.session.phase;
        if matches!(phase, SessionPhase::Stopping | SessionPhase::Finalizing) {
            debug!("Stop requested while already {}", phase.as_str());
        } else if self.session.take_pending_handle().is_some() {
            info!("Stop before capture began; discarding undelivered capture handle");
            self.session.apply(SessionEvent::StopRequested);
            self.schedule_teardown(Duration::ZERO);
        } else {
            info!("Stop requested; finalizing recording");
            self.session.apply(SessionEvent::StopRequested);
            match self.host.send(WorkerCommand::Finalize) {
                Ok(()) => {
                    self.session.apply(SessionEvent::FinalizeSent);
                }
                Err(e) => {
                    warn!("Could not reach worker to finalize: {}", e);
                    self.schedule_teardown(Duration::ZERO);
                }
            }
        }

        self.persist(PersistedStatus::stopped());
        StopResponse { success: true }
    }

    fn status(&mut self) -> StatusResponse {
        let persisted = self.load_persisted();
        let alive = self.host.exists();
        let stale = alive && self.liveness.is_stale(self.settings.staleness_threshold);

        if stale {
            let reason = FailureReason::new(FailureKind::Liveness, "worker heartbeat lost");
            warn!("Capture worker stopped heartbeating; tearing it down");
            self.session.apply(SessionEvent::Failed(reason.to_string()));
            self.persist(PersistedStatus::stopped());
            self.schedule_teardown(Duration::ZERO);
        } else if !alive {
            if persisted.is_some_and(|p| p.is_recording) {
                debug!("Reconciling stale recording flag with no live worker");
                if let Err(e) = self.status_store.clear() {
                    warn!("Failed to clear stale recording state: {:#}", e);
                }
            }
            if !self.session.is_idle() || self.host.current().is_some() {
                self.schedule_teardown(Duration::ZERO);
            }
        }

        let is_recording = alive && !stale && persisted.map(|p| p.is_recording) != Some(false);
        let start_time = if is_recording {
            persisted
                .and_then(|p| p.start_time)
                .or(self.session.start_time)
        } else {
            None
        };

        StatusResponse {
            is_recording,
            start_time,
            phase: self.session.phase,
            last_error: self.session.last_error.clone(),
        }
    }

    async fn handle_worker_message(&mut self, message: WorkerMessage) {
        let WorkerMessage { worker, event } = message;
        if self.session.worker != Some(worker) {
            debug!("Ignoring {} from replaced worker {}", event.name(), worker);
            return;
        }

        match event {
            WorkerEvent::Ready => self.on_worker_ready(),
            WorkerEvent::Started { started_at } => {
                self.on_worker_started(started_at.timestamp_millis())
            }
            WorkerEvent::Heartbeat => self.on_heartbeat(),
            WorkerEvent::ArtifactReady(artifact) => self.on_artifact_ready(artifact).await,
            WorkerEvent::Failed(reason) => self.on_worker_failed(reason),
        }
    }

    fn on_worker_ready(&mut self) {
        let Some(handle) = self.session.take_pending_handle() else {
            debug!("Worker ready with no pending capture handle; ignoring");
            return;
        };

        debug!("Delivering capture handle to worker");
        if let Err(e) = self.host.send(WorkerCommand::Initialize(handle)) {
            self.on_worker_failed(FailureReason::from(&e));
        }
    }

    fn on_worker_started(&mut self, start_time: i64) {
        let phase = self.session.apply(SessionEvent::CaptureConfirmed { start_time });
        if phase == SessionPhase::Active {
            info!("Worker confirmed capture");
            self.persist(PersistedStatus::recording(start_time));
        }
    }

    fn on_heartbeat(&mut self) {
        self.liveness.record();
        self.session.apply(SessionEvent::HeartbeatObserved);
    }

    async fn on_artifact_ready(&mut self, artifact: Artifact) {
        info!(
            "Artifact ready: {} ({} bytes from {} chunks)",
            artifact.suggested_name,
            artifact.size(),
            artifact.chunk_count
        );

        if let Err(e) = self.sink.deliver(artifact).await {
            error!("Failed to deliver recording: {:#}", e);
            self.session.last_error = Some(format!("{e:#}"));
        }

        self.schedule_teardown(self.settings.teardown_grace);
    }

    fn on_worker_failed(&mut self, reason: FailureReason) {
        error!("Recording failed: {}", reason);
        self.session.apply(SessionEvent::Failed(reason.to_string()));
        self.persist(PersistedStatus::stopped());
        self.schedule_teardown(self.settings.teardown_grace);
    }

    fn schedule_teardown(&mut self, delay: Duration) {
        let Some(worker) = self.session.worker.or_else(|| self.host.current()) else {
            return;
        };
        if let Some(pending) = &self.teardown {
            if pending.worker == worker {
                return;
            }
        }
        self.cancel_teardown();

        debug!("Teardown of {} scheduled in {:?}", worker, delay);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = timers.send(worker);
                }
            }
        });

        self.teardown = Some(PendingTeardown { worker, cancel });
    }

    fn cancel_teardown(&mut self) {
        if let Some(pending) = self.teardown.take() {
            debug!("Cancelled pending teardown of {}", pending.worker);
            pending.cancel.cancel();
        }
    }

    async fn on_teardown_due(&mut self, worker: WorkerId) {
        let due = self
            .teardown
            .as_ref()
            .is_some_and(|pending| pending.worker == worker && !pending.cancel.is_cancelled());
        if !due {
            debug!("Ignoring superseded teardown timer for {}", worker);
            return;
        }
        self.teardown = None;
        self.teardown_now().await;
    }

    /// Close the worker context, clear durable state, and return to idle.
    async fn teardown_now(&mut self) {
        if self.host.current().is_some() {
            self.host.close().await;
        }
        if let Err(e) = self.status_store.clear() {
            warn!("Failed to clear recording state: {:#}", e);
        }
        self.liveness.reset();
        self.session.apply(SessionEvent::TornDown);
        info!("Session torn down");
    }

    fn load_persisted(&self) -> Option<PersistedStatus> {
        match self.status_store.load() {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to read recording state: {:#}", e);
                None
            }
        }
    }

    fn persist(&self, status: PersistedStatus) {
        if let Err(e) = self.status_store.save(&status) {
            warn!("Failed to persist recording state: {:#}", e);
        }
    }
}
