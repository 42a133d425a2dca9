//! Session store and call state machine
//!
//! One [`CallSession`] value is the single source of truth for everything the
//! UI renders: call status, media streams, device list, settings, the error
//! log and the retry state. It only ever changes through [`SessionStore::dispatch`],
//! which applies the pure [`transition`] function atomically and publishes the
//! new snapshot over a watch channel - every dispatch is exactly one
//! observable update, including each retry countdown tick.
//!
//! The store performs no I/O and never blocks; side effects (stopping tracks,
//! closing connections) belong to the connection controller, never to the
//! reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::media::{DeviceId, MediaDeviceInfo, MediaStream};
use crate::negotiation::Scenario;

/// Opaque identifier of the live peer connection. The connection object
/// itself is owned exclusively by the connection controller; the store only
/// carries its identity for status inspection.
pub type PeerId = Uuid;

/// Countdown seconds published at the start of every retry attempt
pub const COUNTDOWN_START: u32 = 3;

/// Maximum automatic reconnection attempts per call
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Current status of the call session, the single value UI routing keys on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    /// No call in progress and none has been attempted yet
    Idle,
    /// Waiting for the user to grant capture-device access
    RequestingPermissions,
    /// Media acquired, offer/answer handshake in flight
    Connecting,
    /// Media is flowing both ways
    Connected,
    /// Call over, whether by hangup, setup failure or retry exhaustion
    Disconnected,
    /// Connection lost, reconnect countdown running
    Retrying,
}

impl CallStatus {
    /// Check if the call is in an active state (media can flow)
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Connected)
    }

    /// Check if a new call may be started from this status
    pub fn can_start_call(&self) -> bool {
        matches!(self, CallStatus::Idle | CallStatus::Disconnected)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallStatus::Idle => "idle",
            CallStatus::RequestingPermissions => "requesting-permissions",
            CallStatus::Connecting => "connecting",
            CallStatus::Connected => "connected",
            CallStatus::Disconnected => "disconnected",
            CallStatus::Retrying => "retrying",
        };
        f.write_str(s)
    }
}

/// Capture resolution tier for the outgoing video track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionTier {
    Low,
    #[default]
    Medium,
    High,
}

impl ResolutionTier {
    /// Ideal capture dimensions for this tier
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ResolutionTier::Low => (640, 360),
            ResolutionTier::Medium => (1280, 720),
            ResolutionTier::High => (1920, 1080),
        }
    }
}

/// User-facing media settings. The enabled flags always mirror the enabled
/// state of the corresponding outbound tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSettings {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub selected_audio_device: Option<DeviceId>,
    pub selected_video_device: Option<DeviceId>,
    pub resolution: ResolutionTier,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            selected_audio_device: None,
            selected_video_device: None,
            resolution: ResolutionTier::default(),
        }
    }
}

/// Published reconnection progress.
///
/// Invariants: `current_attempt <= max_attempts`; `is_retrying` holds exactly
/// while the session status is [`CallStatus::Retrying`]; `countdown` is only
/// meaningful while `is_retrying`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub current_attempt: u32,
    pub max_attempts: u32,
    pub countdown: u32,
    pub is_retrying: bool,
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            current_attempt: 0,
            max_attempts: MAX_RETRY_ATTEMPTS,
            countdown: COUNTDOWN_START,
            is_retrying: false,
        }
    }
}

/// One entry of the append-only session error log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    pub kind: ErrorKind,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind, timestamp: Utc::now() }
    }
}

/// Which fault-injection scenario the current call runs under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioState {
    pub kind: Scenario,
    pub active: bool,
}

/// The authoritative call session snapshot published to subscribers
#[derive(Debug, Clone, Default)]
pub struct CallSession {
    pub local_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
    pub peer_connection: Option<PeerId>,
    pub status: CallStatus,
    pub devices: Vec<MediaDeviceInfo>,
    pub settings: CallSettings,
    pub scenario: ScenarioState,
    pub errors: Vec<ErrorEntry>,
    pub retry: RetryState,
}

impl Default for CallStatus {
    fn default() -> Self {
        CallStatus::Idle
    }
}

/// Discrete session transitions. Everything that can change a [`CallSession`]
/// is one of these events, applied by the exhaustive [`transition`] function.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LocalStreamChanged(Option<MediaStream>),
    RemoteStreamChanged(Option<MediaStream>),
    PeerConnectionChanged(Option<PeerId>),
    StatusChanged(CallStatus),
    DevicesChanged(Vec<MediaDeviceInfo>),
    SettingsChanged(CallSettings),
    ToggleAudio,
    ToggleVideo,
    ScenarioChanged(ScenarioState),
    ErrorLogged(ErrorEntry),
    ErrorsCleared,
    /// A reconnection attempt was admitted; countdown restarts from the top
    RetryBegan { attempt: u32, countdown: u32 },
    /// One second elapsed on the live countdown
    RetryCountdownTick { remaining: u32 },
    /// Retry bookkeeping returns to its resting state
    RetryCleared,
    /// Terminal teardown: streams and connection handle dropped
    CallEnded,
}

/// Pure state transition: `(session, event) -> session`.
///
/// Keeping this side-effect free is what makes every observable state
/// reachable in tests without timers or providers.
pub fn transition(mut session: CallSession, event: SessionEvent) -> CallSession {
    match event {
        SessionEvent::LocalStreamChanged(stream) => {
            session.local_stream = stream;
        }
        SessionEvent::RemoteStreamChanged(stream) => {
            session.remote_stream = stream;
        }
        SessionEvent::PeerConnectionChanged(peer) => {
            session.peer_connection = peer;
        }
        SessionEvent::StatusChanged(status) => {
            session.status = status;
        }
        SessionEvent::DevicesChanged(devices) => {
            session.devices = devices;
        }
        SessionEvent::SettingsChanged(settings) => {
            session.settings = settings;
        }
        SessionEvent::ToggleAudio => {
            session.settings.audio_enabled = !session.settings.audio_enabled;
        }
        SessionEvent::ToggleVideo => {
            session.settings.video_enabled = !session.settings.video_enabled;
        }
        SessionEvent::ScenarioChanged(scenario) => {
            session.scenario = scenario;
        }
        SessionEvent::ErrorLogged(entry) => {
            session.errors.push(entry);
        }
        SessionEvent::ErrorsCleared => {
            session.errors.clear();
        }
        SessionEvent::RetryBegan { attempt, countdown } => {
            session.retry.current_attempt = attempt;
            session.retry.countdown = countdown;
            session.retry.is_retrying = true;
        }
        SessionEvent::RetryCountdownTick { remaining } => {
            session.retry.countdown = remaining;
        }
        SessionEvent::RetryCleared => {
            session.retry = RetryState {
                max_attempts: session.retry.max_attempts,
                ..RetryState::default()
            };
        }
        SessionEvent::CallEnded => {
            session.local_stream = None;
            session.remote_stream = None;
            session.peer_connection = None;
            session.scenario.active = false;
            session.status = CallStatus::Disconnected;
        }
    }
    session
}

/// Single authoritative state container.
///
/// Components receive their `Arc<SessionStore>` at construction; there is no
/// process-wide store. Subscribers observe snapshots through
/// [`SessionStore::subscribe`].
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<CallSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CallSession::default());
        Self { tx }
    }

    /// Apply one event atomically and publish the resulting snapshot
    pub fn dispatch(&self, event: SessionEvent) {
        tracing::trace!(event = ?event, "session transition");
        self.tx.send_modify(|session| {
            let next = transition(std::mem::take(session), event);
            *session = next;
        });
    }

    /// Append a classified error to the session log
    pub fn log_error(&self, kind: ErrorKind, message: impl Into<String>) {
        let entry = ErrorEntry::new(kind, message);
        tracing::warn!(kind = %entry.kind, message = %entry.message, "call error");
        self.dispatch(SessionEvent::ErrorLogged(entry));
    }

    /// Current session snapshot
    pub fn snapshot(&self) -> CallSession {
        self.tx.borrow().clone()
    }

    /// Current call status
    pub fn status(&self) -> CallStatus {
        self.tx.borrow().status
    }

    /// Read-only subscription; sees every dispatched update that it keeps up
    /// with, always converging on the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<CallSession> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
