//! Session state owned by the coordinator task, and its transition function.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::CaptureHandle;
use crate::worker::WorkerId;

/// Phase of the recording lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
    Finalizing,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Inputs to the session state machine.
#[derive(Debug)]
pub enum SessionEvent {
    /// A worker was provisioned and a handle acquired for it.
    StartRequested {
        target_id: String,
        worker: WorkerId,
        handle: CaptureHandle,
        start_time: i64,
    },
    /// The worker confirmed capture with its own timestamp.
    CaptureConfirmed { start_time: i64 },
    HeartbeatObserved,
    StopRequested,
    FinalizeSent,
    Failed(String),
    /// A coordinator came up and found this worker still alive.
    Rediscovered {
        worker: WorkerId,
        start_time: Option<i64>,
        recording: bool,
    },
    TornDown,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// Unix timestamp in milliseconds
    pub start_time: Option<i64>,
    pub target_id: Option<String>,
    pub worker: Option<WorkerId>,
    pub last_error: Option<String>,
    pending_handle: Option<CaptureHandle>,
}

impl SessionState {
    /// Apply one event and return the resulting phase.
    pub fn apply(&mut self, event: SessionEvent) -> SessionPhase {
        let from = self.phase;

        match event {
            SessionEvent::StartRequested {
                target_id,
                worker,
                handle,
                start_time,
            } => {
                *self = Self {
                    phase: SessionPhase::Starting,
                    start_time: Some(start_time),
                    target_id: Some(target_id),
                    worker: Some(worker),
                    last_error: None,
                    pending_handle: Some(handle),
                };
            }
            SessionEvent::CaptureConfirmed { start_time } => {
                if self.phase == SessionPhase::Starting {
                    self.phase = SessionPhase::Active;
                }
                if self.phase == SessionPhase::Active {
                    self.start_time = Some(start_time);
                }
            }
            SessionEvent::HeartbeatObserved => {
                if self.phase == SessionPhase::Starting && self.pending_handle.is_none() {
                    self.phase = SessionPhase::Active;
                }
            }
            SessionEvent::StopRequested => {
                if matches!(self.phase, SessionPhase::Starting | SessionPhase::Active) {
                    self.phase = SessionPhase::Stopping;
                }
            }
            SessionEvent::FinalizeSent => {
                if self.phase == SessionPhase::Stopping {
                    self.phase = SessionPhase::Finalizing;
                }
            }
            SessionEvent::Failed(reason) => {
                self.pending_handle = None;
                self.last_error = Some(reason);
                if self.phase != SessionPhase::Idle {
                    self.phase = SessionPhase::Stopping;
                }
            }
            SessionEvent::Rediscovered {
                worker,
                start_time,
                recording,
            } => {
                self.worker = Some(worker);
                self.start_time = start_time;
                self.phase = if recording {
                    SessionPhase::Active
                } else {
                    SessionPhase::Finalizing
                };
            }
            SessionEvent::TornDown => {
                // The last failure stays visible until the next start
                let last_error = self.last_error.take();
                *self = Self {
                    last_error,
                    ..Self::default()
                };
            }
        }

        if from != self.phase {
            debug!("Session {} -> {}", from.as_str(), self.phase.as_str());
        }
        self.phase
    }

    /// Hand out the pending handle. Yields it at most once.
    pub fn take_pending_handle(&mut self) -> Option<CaptureHandle> {
        self.pending_handle.take()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == SessionPhase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn started() -> SessionState {
        let mut state = SessionState::default();
        state.apply(SessionEvent::StartRequested {
            target_id: "monitor".to_string(),
            worker: WorkerId(1),
            handle: CaptureHandle::issue("monitor", "Monitor of Speakers", Duration::from_secs(30)),
            start_time: 1_000,
        });
        state
    }

    #[test]
    fn test_phase_as_str() {
        assert_eq!(SessionPhase::Idle.as_str(), "idle");
        assert_eq!(SessionPhase::Finalizing.as_str(), "finalizing");
        assert_eq!(
            serde_json::to_string(&SessionPhase::Active).unwrap(),
            "\"active\""
        );
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = started();
        assert_eq!(state.phase, SessionPhase::Starting);

        assert!(state.take_pending_handle().is_some());
        assert_eq!(
            state.apply(SessionEvent::CaptureConfirmed { start_time: 1_050 }),
            SessionPhase::Active
        );
        assert_eq!(state.start_time, Some(1_050));

        assert_eq!(state.apply(SessionEvent::StopRequested), SessionPhase::Stopping);
        assert_eq!(state.apply(SessionEvent::FinalizeSent), SessionPhase::Finalizing);
        assert_eq!(state.apply(SessionEvent::TornDown), SessionPhase::Idle);
        assert!(state.worker.is_none());
    }

    #[test]
    fn test_handle_taken_once() {
        let mut state = started();
        assert!(state.take_pending_handle().is_some());
        assert!(state.take_pending_handle().is_none());
    }

    #[test]
    fn test_heartbeat_promotes_only_after_handle_delivery() {
        let mut state = started();
        assert_eq!(state.apply(SessionEvent::HeartbeatObserved), SessionPhase::Starting);

        state.take_pending_handle();
        assert_eq!(state.apply(SessionEvent::HeartbeatObserved), SessionPhase::Active);
    }

    #[test]
    fn test_late_confirmation_does_not_resurrect() {
        let mut state = started();
        state.take_pending_handle();
        state.apply(SessionEvent::StopRequested);
        assert_eq!(
            state.apply(SessionEvent::CaptureConfirmed { start_time: 2_000 }),
            SessionPhase::Stopping
        );
        assert_eq!(state.start_time, Some(1_000));
    }

    #[test]
    fn test_failure_survives_teardown() {
        let mut state = started();
        state.apply(SessionEvent::Failed("mic denied".to_string()));
        assert!(state.take_pending_handle().is_none());
        assert_eq!(state.phase, SessionPhase::Stopping);

        state.apply(SessionEvent::TornDown);
        assert!(state.is_idle());
        assert_eq!(state.last_error.as_deref(), Some("mic denied"));

        let state = started();
        assert!(state.last_error.is_none());
    }
}
