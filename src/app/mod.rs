use crate::api::ApiServer;
use crate::artifact::DownloadDirSink;
use crate::capture::{CpalBackend, DeviceHandleProvider, MediaBackend};
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings, SessionPhase};
use crate::db::{ChunkStore, StatusStore};
use crate::worker::{WorkerHost, WorkerSettings};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting meetcap service");

    let config = Config::load()?;
    let db_path = config.storage.resolve_database_path()?;
    let download_dir = config.output.resolve_download_dir()?;

    let status_store = StatusStore::open(&db_path)?;
    let leftover = ChunkStore::open(&db_path)?.count()?;
    if leftover > 0 {
        warn!(
            "{} chunks from an unfinished recording are still stored; they are discarded at the next start",
            leftover
        );
    }

    let backend: Arc<dyn MediaBackend> = Arc::new(CpalBackend::new(config.capture.loopback_playback));
    let host = Arc::new(WorkerHost::new(
        backend,
        WorkerSettings::from_config(&config),
        db_path.clone(),
    ));

    let coordinator = Coordinator::spawn(
        Arc::clone(&host),
        Arc::new(DeviceHandleProvider::new(config.capture.handle_ttl())),
        Arc::new(DownloadDirSink::new(download_dir.clone())),
        status_store,
        CoordinatorSettings::from_config(&config),
    );

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let api_server = ApiServer::new(coordinator.clone(), &config);
    let server = tokio::spawn(async move {
        if let Err(e) = api_server
            .start(async move { server_shutdown.cancelled().await })
            .await
        {
            error!("API server failed: {:#}", e);
        }
    });

    info!("meetcap is ready!");
    info!("Database: {:?}", db_path);
    info!("Recordings are saved to {:?}", download_dir);
    info!(
        "Try: curl -X POST http://127.0.0.1:{}/start -H 'Content-Type: application/json' -d '{{\"targetId\":\"monitor\"}}'",
        config.api.port
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    shutdown.cancel();
    let deadline = config.capture.flush_interval()
        + config.coordinator.teardown_grace()
        + Duration::from_secs(5);
    stop_active_recording(&coordinator, deadline).await;
    host.close().await;

    if let Err(e) = server.await {
        warn!("API server task ended abnormally: {}", e);
    }

    info!("meetcap stopped");
    Ok(())
}

/// Stop a running recording and wait for it to be saved, up to `timeout`.
async fn stop_active_recording(coordinator: &CoordinatorHandle, timeout: Duration) {
    match coordinator.status().await {
        Ok(status) if status.is_recording => {}
        Ok(_) => return,
        Err(e) => {
            warn!("Could not query recording status on shutdown: {:#}", e);
            return;
        }
    }

    info!("Saving the active recording before exit");
    if let Err(e) = coordinator.stop().await {
        warn!("Failed to stop recording on shutdown: {:#}", e);
        return;
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match coordinator.status().await {
            Ok(status) if status.phase == SessionPhase::Idle => {
                info!("Recording saved");
                return;
            }
            Ok(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            Err(_) => return,
        }
    }

    warn!("Timed out waiting for the recording to finalize");
}
