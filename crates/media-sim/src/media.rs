//! Simulated capture stack
//!
//! Serves streams from a configurable device table and fails on demand with
//! a platform error name, which is all the core needs to exercise its
//! acquisition classification.

use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use peerline_call_core::{
    CallResult, MediaConstraints, MediaDeviceInfo, MediaDeviceKind, MediaProvider, MediaStream,
    MediaTrack, PlatformMediaError, TrackKind,
};

/// Simulated [`MediaProvider`] with failure injection
pub struct SimMediaProvider {
    devices: RwLock<Vec<MediaDeviceInfo>>,
    failure: Mutex<Option<PlatformMediaError>>,
    changes: broadcast::Sender<()>,
}

impl SimMediaProvider {
    /// Provider with one microphone, one camera and one speaker
    pub fn new() -> Self {
        Self::with_devices(Self::default_devices())
    }

    pub fn with_devices(devices: Vec<MediaDeviceInfo>) -> Self {
        let (changes, _) = broadcast::channel(8);
        Self { devices: RwLock::new(devices), failure: Mutex::new(None), changes }
    }

    pub fn default_devices() -> Vec<MediaDeviceInfo> {
        vec![
            MediaDeviceInfo {
                id: "sim-audio-0".into(),
                kind: MediaDeviceKind::AudioInput,
                label: "Simulated Microphone".into(),
            },
            MediaDeviceInfo {
                id: "sim-video-0".into(),
                kind: MediaDeviceKind::VideoInput,
                label: "Simulated Camera".into(),
            },
            MediaDeviceInfo {
                id: "sim-speaker-0".into(),
                kind: MediaDeviceKind::AudioOutput,
                label: "Simulated Speaker".into(),
            },
        ]
    }

    /// The default table plus a second camera, for switch tests
    pub fn dual_camera_devices() -> Vec<MediaDeviceInfo> {
        let mut devices = Self::default_devices();
        devices.push(MediaDeviceInfo {
            id: "sim-video-1".into(),
            kind: MediaDeviceKind::VideoInput,
            label: "Simulated Rear Camera".into(),
        });
        devices
    }

    /// Replace the device table and emit a device-change notification
    pub fn set_devices(&self, devices: Vec<MediaDeviceInfo>) {
        *self.devices.write().expect("device table lock poisoned") = devices;
        let _ = self.changes.send(());
    }

    /// Make every subsequent acquisition fail with this platform error name
    pub fn fail_with(&self, name: impl Into<String>, message: impl Into<String>) {
        *self.failure.lock().expect("failure lock poisoned") =
            Some(PlatformMediaError::new(name, message));
    }

    /// Let acquisitions succeed again
    pub fn clear_failure(&self) {
        *self.failure.lock().expect("failure lock poisoned") = None;
    }

    fn pick_device(
        &self,
        devices: &[MediaDeviceInfo],
        kind: MediaDeviceKind,
        requested: Option<&str>,
    ) -> Result<MediaDeviceInfo, PlatformMediaError> {
        let candidates: Vec<_> = devices.iter().filter(|d| d.kind == kind).collect();
        match requested {
            Some(id) => candidates
                .iter()
                .find(|d| d.id == id)
                .map(|d| (**d).clone())
                .ok_or_else(|| {
                    PlatformMediaError::new("NotFoundError", format!("no such device: {id}"))
                }),
            None => candidates.first().map(|d| (**d).clone()).ok_or_else(|| {
                PlatformMediaError::new("NotFoundError", format!("no {kind:?} devices attached"))
            }),
        }
    }
}

impl Default for SimMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for SimMediaProvider {
    async fn get_stream(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, PlatformMediaError> {
        // the real permission prompt suspends at least once
        tokio::task::yield_now().await;

        if let Some(failure) = self.failure.lock().expect("failure lock poisoned").clone() {
            return Err(failure);
        }

        let devices = self.devices.read().expect("device table lock poisoned").clone();
        let mut tracks = Vec::new();
        if constraints.audio {
            let device = self.pick_device(
                &devices,
                MediaDeviceKind::AudioInput,
                constraints.audio_device.as_deref(),
            )?;
            tracks.push(MediaTrack::new(TrackKind::Audio, Some(device.id)));
        }
        if constraints.video {
            let device = self.pick_device(
                &devices,
                MediaDeviceKind::VideoInput,
                constraints.video_device.as_deref(),
            )?;
            tracks.push(MediaTrack::new(TrackKind::Video, Some(device.id)));
        }

        let stream = MediaStream::new(tracks);
        debug!(stream = %stream.id(), tracks = stream.tracks().len(), "serving simulated stream");
        Ok(stream)
    }

    async fn enumerate_devices(&self) -> CallResult<Vec<MediaDeviceInfo>> {
        Ok(self.devices.read().expect("device table lock poisoned").clone())
    }

    fn subscribe_device_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_audio_and_video_from_default_devices() {
        let provider = SimMediaProvider::new();
        let constraints = MediaConstraints {
            audio: true,
            video: true,
            ..Default::default()
        };
        let stream = provider.get_stream(&constraints).await.unwrap();
        assert_eq!(stream.audio_tracks().len(), 1);
        assert_eq!(stream.video_tracks().len(), 1);
        assert_eq!(
            stream.video_tracks()[0].device_id().as_deref(),
            Some("sim-video-0")
        );
    }

    #[tokio::test]
    async fn injected_failure_surfaces_with_platform_name() {
        let provider = SimMediaProvider::new();
        provider.fail_with("NotAllowedError", "user dismissed the prompt");
        let err = provider
            .get_stream(&MediaConstraints { audio: true, video: true, ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.name, "NotAllowedError");

        provider.clear_failure();
        assert!(provider
            .get_stream(&MediaConstraints { audio: true, video: true, ..Default::default() })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let provider = SimMediaProvider::new();
        let constraints = MediaConstraints {
            video: true,
            video_device: Some("sim-video-9".into()),
            ..Default::default()
        };
        let err = provider.get_stream(&constraints).await.unwrap_err();
        assert_eq!(err.name, "NotFoundError");
    }

    #[tokio::test]
    async fn set_devices_notifies_subscribers() {
        let provider = SimMediaProvider::new();
        let mut changes = provider.subscribe_device_changes();
        provider.set_devices(SimMediaProvider::dual_camera_devices());
        changes.recv().await.unwrap();
        assert_eq!(provider.enumerate_devices().await.unwrap().len(), 4);
    }
}
