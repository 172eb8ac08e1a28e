//! Fake media, providers and sinks for driving the real coordinator and
//! worker without audio hardware.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use meetcap::artifact::{Artifact, ArtifactSink};
use meetcap::audio::AudioSource;
use meetcap::audio::PlaybackSink;
use meetcap::capture::{CaptureHandle, CaptureHandleProvider, MediaBackend};
use meetcap::coordinator::{
    Coordinator, CoordinatorHandle, CoordinatorSettings, SessionPhase, StatusResponse,
};
use meetcap::db::{ChunkStore, PersistedStatus, StatusStore};
use meetcap::error::CaptureError;
use meetcap::worker::{WorkerHost, WorkerSettings};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

pub const RATE: u32 = 16_000;
pub const WINDOW: usize = 160;
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A source that yields `windows` non-empty windows and then silence.
pub struct FakeSource {
    rate: u32,
    level: f32,
    windows: usize,
    drains: usize,
    fail_after: Option<usize>,
    stall: Option<(usize, Duration)>,
    active: bool,
}

impl AudioSource for FakeSource {
    fn start(&mut self) -> Result<()> {
        self.active = true;
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<f32>> {
        if let Some(limit) = self.fail_after {
            if self.drains >= limit {
                return Err(anyhow!("device disconnected"));
            }
        }
        self.drains += 1;
        if let Some((at, duration)) = self.stall {
            if self.drains == at {
                std::thread::sleep(duration);
            }
        }
        if self.drains <= self.windows {
            Ok(vec![self.level; WINDOW])
        } else {
            Ok(Vec::new())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }
}

/// Records everything sent to local playback.
#[derive(Clone, Default)]
pub struct FakePlayback {
    pub played: Arc<Mutex<Vec<f32>>>,
}

impl PlaybackSink for FakePlayback {
    fn play(&mut self, samples: &[f32], _sample_rate: u32) {
        self.played.lock().unwrap().extend_from_slice(samples);
    }
}

/// Opens `FakeSource`s; configure failures per instance.
#[derive(Clone)]
pub struct FakeBackend {
    pub windows: usize,
    pub mic_denied: bool,
    pub monitor_fail_after: Option<usize>,
    pub monitor_stall: Option<(usize, Duration)>,
    pub playback: Option<FakePlayback>,
    pub opened: Arc<AtomicUsize>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            windows: 3,
            mic_denied: false,
            monitor_fail_after: None,
            monitor_stall: None,
            playback: None,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MediaBackend for FakeBackend {
    fn open_monitor(&self, _handle: &CaptureHandle) -> Result<Box<dyn AudioSource>, CaptureError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            rate: RATE,
            level: 0.25,
            windows: self.windows,
            drains: 0,
            fail_after: self.monitor_fail_after,
            stall: self.monitor_stall,
            active: false,
        }))
    }

    fn open_microphone(&self) -> Result<Box<dyn AudioSource>, CaptureError> {
        if self.mic_denied {
            return Err(CaptureError::Permission("microphone access denied".into()));
        }
        Ok(Box::new(FakeSource {
            rate: RATE,
            level: -0.1,
            windows: self.windows,
            drains: 0,
            fail_after: None,
            stall: None,
            active: false,
        }))
    }

    fn open_playback(&self) -> Result<Option<Box<dyn PlaybackSink>>, CaptureError> {
        Ok(self
            .playback
            .clone()
            .map(|playback| Box::new(playback) as Box<dyn PlaybackSink>))
    }
}

pub struct FakeProvider {
    pub ttl: Duration,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl CaptureHandleProvider for FakeProvider {
    async fn acquire(&self, target_id: &str) -> Result<CaptureHandle, CaptureError> {
        if target_id == "missing" {
            return Err(CaptureError::Provisioning(format!(
                "no capture source matches target {target_id:?}"
            )));
        }
        let handle = CaptureHandle::issue(target_id, "Fake Monitor", self.ttl);
        if self.ttl.is_zero() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(handle)
    }
}

#[derive(Clone, Default)]
pub struct CollectingSink {
    pub artifacts: Arc<Mutex<Vec<Artifact>>>,
}

#[async_trait]
impl ArtifactSink for CollectingSink {
    async fn deliver(&self, artifact: Artifact) -> Result<PathBuf> {
        let name = PathBuf::from(&artifact.suggested_name);
        self.artifacts.lock().unwrap().push(artifact);
        Ok(name)
    }
}

pub fn worker_settings() -> WorkerSettings {
    WorkerSettings {
        sample_rate: RATE,
        flush_interval: Duration::from_millis(20),
        heartbeat_interval: Duration::from_millis(20),
        playback_interval: Duration::from_millis(5),
        append_attempts: 3,
        append_backoff: Duration::from_millis(5),
        filename_prefix: "test-recording".to_string(),
    }
}

pub fn coordinator_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        teardown_grace: Duration::from_millis(50),
        staleness_threshold: Duration::from_secs(2),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub host: Arc<WorkerHost>,
    pub provider: Arc<FakeProvider>,
    pub sink: CollectingSink,
    pub settings: CoordinatorSettings,
    pub coordinator: CoordinatorHandle,
    opened: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with(backend, FakeProvider::default(), coordinator_settings())
    }

    /// Must be called from within a tokio runtime.
    pub fn with(backend: FakeBackend, provider: FakeProvider, settings: CoordinatorSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("meetcap.db");
        let opened = Arc::clone(&backend.opened);
        let host = Arc::new(WorkerHost::new(
            Arc::new(backend),
            worker_settings(),
            db_path.clone(),
        ));
        let provider = Arc::new(provider);
        let sink = CollectingSink::default();
        let coordinator = spawn_coordinator(&host, &provider, &sink, &db_path, &settings);

        Self {
            dir,
            db_path,
            host,
            provider,
            sink,
            settings,
            coordinator,
            opened,
        }
    }

    /// How many times a worker got as far as opening the monitored source.
    pub fn backend_opens(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Replace the coordinator with a fresh instance, as after a crash.
    pub fn restart_coordinator(&mut self) {
        self.coordinator = spawn_coordinator(
            &self.host,
            &self.provider,
            &self.sink,
            &self.db_path,
            &self.settings,
        );
    }

    pub async fn status(&self) -> StatusResponse {
        self.coordinator.status().await.unwrap()
    }

    pub fn chunk_store(&self) -> ChunkStore {
        ChunkStore::open(&self.db_path).unwrap()
    }

    pub fn persisted(&self) -> Option<PersistedStatus> {
        StatusStore::open(&self.db_path).unwrap().load().unwrap()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.sink.artifacts.lock().unwrap().clone()
    }

    pub async fn wait_for_phase(&self, phase: SessionPhase) -> StatusResponse {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let status = self.status().await;
            if status.phase == phase {
                return status;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {:?}, last status {:?}",
                phase,
                status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_chunks(&self, count: i64) {
        let store = self.chunk_store();
        let deadline = Instant::now() + TIMEOUT;
        while store.count().unwrap() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} chunks");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_artifacts(&self, count: usize) {
        let deadline = Instant::now() + TIMEOUT;
        while self.artifacts().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} artifacts");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until the worker is done and the session is back to idle.
    pub async fn wait_for_teardown(&self) -> StatusResponse {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let status = self.status().await;
            if status.phase == SessionPhase::Idle && self.host.current().is_none() {
                return status;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for teardown, last status {:?}",
                status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn spawn_coordinator(
    host: &Arc<WorkerHost>,
    provider: &Arc<FakeProvider>,
    sink: &CollectingSink,
    db_path: &PathBuf,
    settings: &CoordinatorSettings,
) -> CoordinatorHandle {
    Coordinator::spawn(
        Arc::clone(host),
        provider.clone(),
        Arc::new(sink.clone()),
        StatusStore::open(db_path).unwrap(),
        settings.clone(),
    )
}
