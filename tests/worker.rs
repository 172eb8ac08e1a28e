//! The worker side of the protocol, driven directly through the host.

mod common;

use common::{worker_settings, FakeBackend, FakePlayback};
use meetcap::capture::CaptureHandle;
use meetcap::db::ChunkStore;
use meetcap::error::FailureKind;
use meetcap::worker::{WorkerCommand, WorkerEvent, WorkerHost, WorkerMessage, WorkerSettings};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

fn handle() -> CaptureHandle {
    CaptureHandle::issue("monitor", "Fake Monitor", Duration::from_secs(30))
}

/// Next event that is not a heartbeat.
async fn next_event(events: &mut UnboundedReceiver<WorkerMessage>) -> WorkerEvent {
    loop {
        let message = timeout(common::TIMEOUT, events.recv())
            .await
            .expect("worker went quiet")
            .expect("event channel closed");
        if !matches!(message.event, WorkerEvent::Heartbeat) {
            return message.event;
        }
    }
}

fn host(dir: &TempDir, backend: FakeBackend) -> (WorkerHost, UnboundedReceiver<WorkerMessage>) {
    host_with(dir, backend, worker_settings())
}

fn host_with(
    dir: &TempDir,
    backend: FakeBackend,
    settings: WorkerSettings,
) -> (WorkerHost, UnboundedReceiver<WorkerMessage>) {
    let host = WorkerHost::new(Arc::new(backend), settings, dir.path().join("meetcap.db"));
    let (tx, rx) = mpsc::unbounded_channel();
    host.attach(tx);
    (host, rx)
}

#[tokio::test]
async fn worker_announces_ready_then_started() {
    let dir = TempDir::new().unwrap();
    let (host, mut events) = host(&dir, FakeBackend::default());

    let id = host.create().unwrap();
    let message = timeout(common::TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert_eq!(message.worker, id);
    assert!(matches!(message.event, WorkerEvent::Ready));

    host.send(WorkerCommand::Initialize(handle())).unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Started { .. }));

    host.close().await;
    assert!(!host.exists());
}

#[tokio::test]
async fn second_initialize_is_ignored() {
    let dir = TempDir::new().unwrap();
    let (host, mut events) = host(&dir, FakeBackend::default());

    host.create().unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Ready));

    host.send(WorkerCommand::Initialize(handle())).unwrap();
    host.send(WorkerCommand::Initialize(handle())).unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Started { .. }));

    // Only heartbeats follow; no second start and no failure
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(message) = events.try_recv() {
        assert!(
            matches!(message.event, WorkerEvent::Heartbeat),
            "unexpected {}",
            message.event.name()
        );
    }

    host.close().await;
}

#[tokio::test]
async fn finalize_before_initialize_reports_nothing_recorded() {
    let dir = TempDir::new().unwrap();
    let (host, mut events) = host(&dir, FakeBackend::default());

    host.create().unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Ready));

    host.send(WorkerCommand::Finalize).unwrap();
    match next_event(&mut events).await {
        WorkerEvent::Failed(reason) => {
            assert_eq!(reason.kind, FailureKind::Pipeline);
            assert!(reason.message.contains("before capture"));
        }
        other => panic!("expected failure, got {}", other.name()),
    }
    assert!(host.exists());

    host.close().await;
}

#[tokio::test]
async fn finalize_right_after_initialize_delivers_artifact() {
    let dir = TempDir::new().unwrap();
    let (host, mut events) = host(&dir, FakeBackend::default());

    host.create().unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Ready));

    // Queued back to back: the worker handles them in order
    host.send(WorkerCommand::Initialize(handle())).unwrap();
    host.send(WorkerCommand::Finalize).unwrap();

    assert!(matches!(next_event(&mut events).await, WorkerEvent::Started { .. }));
    match next_event(&mut events).await {
        WorkerEvent::ArtifactReady(artifact) => {
            assert!(artifact.chunk_count >= 1);
            assert_eq!(&artifact.bytes[0..4], b"RIFF");
        }
        other => panic!("expected artifact, got {}", other.name()),
    }

    let store = ChunkStore::open(&dir.path().join("meetcap.db")).unwrap();
    assert_eq!(store.count().unwrap(), 0);

    // A repeated finalize after the artifact changes nothing
    host.send(WorkerCommand::Finalize).unwrap();
    assert!(timeout(Duration::from_millis(150), next_event(&mut events))
        .await
        .is_err());

    host.close().await;
}

#[tokio::test]
async fn permission_denial_is_reported_as_failure() {
    let dir = TempDir::new().unwrap();
    let (host, mut events) = host(
        &dir,
        FakeBackend {
            mic_denied: true,
            ..FakeBackend::default()
        },
    );

    host.create().unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Ready));
    host.send(WorkerCommand::Initialize(handle())).unwrap();

    match next_event(&mut events).await {
        WorkerEvent::Failed(reason) => assert_eq!(reason.kind, FailureKind::Permission),
        other => panic!("expected failure, got {}", other.name()),
    }

    host.close().await;
}

#[tokio::test]
async fn create_refuses_while_a_worker_is_alive() {
    let dir = TempDir::new().unwrap();
    let (host, _events) = host(&dir, FakeBackend::default());

    let first = host.create().unwrap();
    assert!(host.create().is_err());
    assert_eq!(host.live_worker(), Some(first));

    host.close().await;
    let second = host.create().unwrap();
    assert_ne!(first, second);
    host.close().await;
}

#[tokio::test]
async fn monitored_audio_reaches_playback_before_the_flush() {
    let dir = TempDir::new().unwrap();
    let playback = FakePlayback::default();
    let played = Arc::clone(&playback.played);
    let mut settings = worker_settings();
    settings.flush_interval = Duration::from_secs(30);
    let (host, mut events) = host_with(
        &dir,
        FakeBackend {
            playback: Some(playback),
            ..FakeBackend::default()
        },
        settings,
    );

    host.create().unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Ready));
    host.send(WorkerCommand::Initialize(handle())).unwrap();
    assert!(matches!(next_event(&mut events).await, WorkerEvent::Started { .. }));

    let deadline = tokio::time::Instant::now() + common::TIMEOUT;
    while played.lock().unwrap().len() < 3 * common::WINDOW {
        assert!(tokio::time::Instant::now() < deadline, "playback never caught up");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(played.lock().unwrap().len(), 3 * common::WINDOW);

    // Nothing has been encoded yet; the window is still open
    let store = ChunkStore::open(&dir.path().join("meetcap.db")).unwrap();
    assert_eq!(store.count().unwrap(), 0);

    // Finalize still encodes the whole window
    host.send(WorkerCommand::Finalize).unwrap();
    match next_event(&mut events).await {
        WorkerEvent::ArtifactReady(artifact) => {
            let reader = hound::WavReader::new(std::io::Cursor::new(artifact.bytes)).unwrap();
            assert_eq!(reader.len() as usize, 3 * common::WINDOW);
        }
        other => panic!("expected artifact, got {}", other.name()),
    }

    host.close().await;
}
