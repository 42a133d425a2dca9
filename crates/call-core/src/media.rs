//! Media acquisition and media handle types
//!
//! The [`MediaProvider`] trait is the seam to the platform capture stack.
//! Acquisition failures arrive as [`PlatformMediaError`]s carrying the
//! underlying platform error name; [`acquire_local_media`] classifies them
//! into the session [`ErrorKind`]s, appends them to the error log and
//! re-raises. It never decides the next call status - that is the connection
//! controller's call.
//!
//! [`MediaStream`] and [`MediaTrack`] are cheap `Arc`-backed handles. A track
//! is never stopped to mute it; muting flips the `enabled` flag so re-enable
//! is instant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{CallError, CallResult, ErrorKind};
use crate::session::{CallStatus, CallSettings, ResolutionTier, SessionEvent, SessionStore};

/// Platform identifier of a capture or playback device
pub type DeviceId = String;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Kind of an enumerable media device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDeviceKind {
    AudioInput,
    VideoInput,
    AudioOutput,
}

/// One enumerable media device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub id: DeviceId,
    pub kind: MediaDeviceKind,
    pub label: String,
}

/// Constraints passed to [`MediaProvider::get_stream`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub audio_device: Option<DeviceId>,
    pub video_device: Option<DeviceId>,
    pub resolution: ResolutionTier,
}

impl MediaConstraints {
    /// Full audio+video capture matching the current session settings
    pub fn from_settings(settings: &CallSettings) -> Self {
        Self {
            audio: true,
            video: true,
            audio_device: settings.selected_audio_device.clone(),
            video_device: settings.selected_video_device.clone(),
            resolution: settings.resolution,
        }
    }

    /// Video-only capture from a specific device, used for camera switching
    pub fn video_only(device: DeviceId, resolution: ResolutionTier) -> Self {
        Self {
            audio: false,
            video: true,
            audio_device: None,
            video_device: Some(device),
            resolution,
        }
    }
}

#[derive(Debug)]
struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    device_id: Option<DeviceId>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Handle to a single live audio or video track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, device_id: Option<DeviceId>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                device_id,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Device this track captures from, if known
    pub fn device_id(&self) -> Option<DeviceId> {
        self.inner.device_id.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Flip the mute flag. The track keeps capturing; it just goes silent.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Release the underlying capture. Safe to call more than once.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct StreamInner {
    id: Uuid,
    tracks: Vec<MediaTrack>,
}

/// Handle to a group of tracks captured together
#[derive(Debug, Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { inner: Arc::new(StreamInner { id: Uuid::new_v4(), tracks }) }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of_kind(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of_kind(TrackKind::Video)
    }

    fn tracks_of_kind(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.inner.tracks.iter().filter(|t| t.kind() == kind).cloned().collect()
    }

    /// Stop every track in the stream
    pub fn stop_all(&self) {
        for track in &self.inner.tracks {
            track.stop();
        }
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

/// Raw acquisition failure as reported by the platform, identified by the
/// platform's error name (`NotAllowedError`, `NotFoundError`, ...)
#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct PlatformMediaError {
    pub name: String,
    pub message: String,
}

impl PlatformMediaError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into() }
    }

    /// Session log classification for this platform error name
    pub fn kind(&self) -> ErrorKind {
        match self.name.as_str() {
            "NotAllowedError" => ErrorKind::PermissionsDenied,
            "NotFoundError" => ErrorKind::DeviceNotFound,
            "NotReadableError" => ErrorKind::DeviceBusy,
            _ => ErrorKind::Unknown,
        }
    }
}

impl From<PlatformMediaError> for CallError {
    fn from(err: PlatformMediaError) -> Self {
        let reason = err.to_string();
        match err.kind() {
            ErrorKind::PermissionsDenied => CallError::PermissionsDenied { reason },
            ErrorKind::DeviceNotFound => CallError::DeviceNotFound { reason },
            ErrorKind::DeviceBusy => CallError::DeviceBusy { reason },
            _ => CallError::MediaUnavailable { reason },
        }
    }
}

/// Seam to the platform capture stack
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Acquire a live stream satisfying `constraints`
    async fn get_stream(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, PlatformMediaError>;

    /// List the currently attached devices
    async fn enumerate_devices(&self) -> CallResult<Vec<MediaDeviceInfo>>;

    /// Notified whenever the device set changes; receivers re-enumerate
    fn subscribe_device_changes(&self) -> broadcast::Receiver<()>;
}

/// Acquire local capture for a call attempt.
///
/// Sets the session status to `requesting-permissions` before touching the
/// provider. On failure the classified error is appended to the session log
/// and re-raised unchanged; the caller decides the next status.
pub async fn acquire_local_media(
    provider: &dyn MediaProvider,
    store: &SessionStore,
    constraints: &MediaConstraints,
) -> CallResult<MediaStream> {
    store.dispatch(SessionEvent::StatusChanged(CallStatus::RequestingPermissions));

    match provider.get_stream(constraints).await {
        Ok(stream) => {
            tracing::debug!(
                stream = %stream.id(),
                tracks = stream.tracks().len(),
                "local media acquired"
            );
            Ok(stream)
        }
        Err(platform) => {
            let error = CallError::from(platform);
            store.log_error(error.kind(), error.to_string());
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_names_classify() {
        let cases = [
            ("NotAllowedError", ErrorKind::PermissionsDenied),
            ("NotFoundError", ErrorKind::DeviceNotFound),
            ("NotReadableError", ErrorKind::DeviceBusy),
            ("OverconstrainedError", ErrorKind::Unknown),
        ];
        for (name, kind) in cases {
            assert_eq!(PlatformMediaError::new(name, "x").kind(), kind, "{name}");
        }
    }

    #[test]
    fn mute_does_not_stop_the_track() {
        let track = MediaTrack::new(TrackKind::Audio, None);
        assert!(track.is_enabled());
        track.set_enabled(false);
        assert!(!track.is_enabled());
        assert!(!track.is_stopped());
        track.set_enabled(true);
        assert!(track.is_enabled());
    }

    #[test]
    fn stop_is_idempotent() {
        let track = MediaTrack::new(TrackKind::Video, Some("cam-0".into()));
        track.stop();
        track.stop();
        assert!(track.is_stopped());
    }

    #[test]
    fn device_kind_uses_platform_spellings() {
        let json = serde_json::to_string(&MediaDeviceKind::VideoInput).unwrap();
        assert_eq!(json, "\"videoinput\"");
    }
}
