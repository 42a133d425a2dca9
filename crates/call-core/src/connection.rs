//! Connection controller
//!
//! Owns the live peer transport and drives every call status transition
//! except the retry-owned ones: acquisition, the offer/answer handshake,
//! transport lifecycle events, track-level mute and camera switching, and
//! teardown. Connection losses are detected here and handed to the
//! [`RetryOrchestrator`]; the controller never decides retry policy itself.
//!
//! A generation counter guards every completion path. Ending a call or
//! replacing the transport bumps the generation, so a handler or an in-flight
//! handshake belonging to a superseded connection can observe that it is
//! stale and stand down instead of corrupting the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CallError, CallResult, ErrorKind};
use crate::media::{acquire_local_media, MediaConstraints, MediaProvider, TrackKind};
use crate::negotiation::{NegotiationProvider, Scenario};
use crate::retry::RetryOrchestrator;
use crate::session::{
    CallStatus, ScenarioState, SessionEvent, SessionStore,
};
use crate::transport::{
    IceServer, PeerTransport, TransportEvent, TransportFactory,
};

/// Timing of the `connection-drop` scenario's injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSchedule {
    /// How long after the handshake the outbound tracks are stopped and the
    /// connection closed
    pub drop_after: Duration,
    /// Pause between closing the connection and running the loss path
    pub settle: Duration,
}

impl Default for FaultSchedule {
    fn default() -> Self {
        Self { drop_after: Duration::from_secs(3), settle: Duration::from_millis(500) }
    }
}

struct ActiveConnection {
    transport: Arc<dyn PeerTransport>,
    events: JoinHandle<()>,
}

/// Owns the peer connection and executes the call state machine
pub struct ConnectionController {
    store: Arc<SessionStore>,
    media: Arc<dyn MediaProvider>,
    transports: Arc<dyn TransportFactory>,
    negotiation: Arc<dyn NegotiationProvider>,
    retry: Arc<RetryOrchestrator>,
    ice_servers: Vec<IceServer>,
    fault: FaultSchedule,
    weak_self: OnceLock<Weak<ConnectionController>>,
    /// Serializes start/reconnect/end so teardown cannot interleave with a
    /// handshake
    ops: Mutex<()>,
    active: Mutex<Option<ActiveConnection>>,
    scenario: StdMutex<Scenario>,
    fault_task: StdMutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl ConnectionController {
    pub fn new(
        store: Arc<SessionStore>,
        media: Arc<dyn MediaProvider>,
        transports: Arc<dyn TransportFactory>,
        negotiation: Arc<dyn NegotiationProvider>,
        ice_servers: Vec<IceServer>,
        fault: FaultSchedule,
        retry: Arc<RetryOrchestrator>,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            store,
            media,
            transports,
            negotiation,
            retry,
            ice_servers,
            fault,
            weak_self: OnceLock::new(),
            ops: Mutex::new(()),
            active: Mutex::new(None),
            scenario: StdMutex::new(Scenario::default()),
            fault_task: StdMutex::new(None),
            generation: AtomicU64::new(0),
        });
        controller
            .weak_self
            .set(Arc::downgrade(&controller))
            .expect("weak self set once at construction");
        controller.retry.bind(Arc::downgrade(&controller));
        controller
    }

    /// Start a new call under the given scenario. Valid only while idle or
    /// disconnected.
    pub async fn start_call(&self, scenario: Scenario) -> CallResult<()> {
        let _ops = self.ops.lock().await;

        let status = self.store.status();
        if !status.can_start_call() {
            return Err(CallError::invalid_state("idle or disconnected", status));
        }

        info!(%scenario, "starting call");
        *self.scenario.lock().expect("scenario lock poisoned") = scenario;

        self.negotiation.start().await.map_err(|error| {
            self.store.log_error(
                ErrorKind::Connection,
                format!("failed to open negotiation session: {error}"),
            );
            error
        })?;
        self.store.dispatch(SessionEvent::ScenarioChanged(ScenarioState {
            kind: scenario,
            active: true,
        }));

        let generation = self.next_generation();
        match self.establish(generation).await {
            Ok(()) => {
                if scenario == Scenario::ConnectionDrop {
                    self.schedule_drop(generation);
                }
                Ok(())
            }
            Err(CallError::Cancelled) => Err(CallError::Cancelled),
            Err(error) => {
                // acquisition failures logged their own classified entry
                if !error.is_acquisition_error() {
                    self.store
                        .log_error(ErrorKind::Connection, "failed to create call session");
                }
                self.cleanup_failed_setup().await;
                self.store.dispatch(SessionEvent::StatusChanged(CallStatus::Disconnected));
                Err(error)
            }
        }
    }

    /// Close and discard the old connection, then re-run the handshake.
    /// Called by the retry orchestrator when a countdown reaches zero.
    pub(crate) async fn reconnect(&self) -> CallResult<()> {
        let _ops = self.ops.lock().await;

        // the call may have been ended while we waited for the lock
        if self.store.status() != CallStatus::Retrying {
            return Err(CallError::Cancelled);
        }

        info!("attempting reconnection");
        let generation = self.next_generation();
        if let Some(old) = self.active.lock().await.take() {
            old.events.abort();
            old.transport.close().await;
        }
        self.store.dispatch(SessionEvent::PeerConnectionChanged(None));
        self.store.dispatch(SessionEvent::StatusChanged(CallStatus::Connecting));
        self.establish(generation).await
    }

    /// Run one full handshake: acquire media, build a transport, attach
    /// tracks, then offer / local / answer / remote.
    async fn establish(&self, generation: u64) -> CallResult<()> {
        let scenario = *self.scenario.lock().expect("scenario lock poisoned");
        let settings = self.store.snapshot().settings;

        let constraints = MediaConstraints::from_settings(&settings);
        let local = acquire_local_media(self.media.as_ref(), &self.store, &constraints).await?;
        if self.is_stale(generation) {
            local.stop_all();
            return Err(CallError::Cancelled);
        }

        // fresh tracks come up enabled; honor whatever the user muted
        for track in local.tracks() {
            match track.kind() {
                TrackKind::Audio => track.set_enabled(settings.audio_enabled),
                TrackKind::Video => track.set_enabled(settings.video_enabled),
            }
        }
        self.store.dispatch(SessionEvent::LocalStreamChanged(Some(local.clone())));
        self.store.dispatch(SessionEvent::StatusChanged(CallStatus::Connecting));

        let transport = self.transports.create(&self.ice_servers).await?;
        if self.is_stale(generation) {
            transport.close().await;
            local.stop_all();
            return Err(CallError::Cancelled);
        }
        self.store.dispatch(SessionEvent::PeerConnectionChanged(Some(transport.id())));

        let events = self.spawn_event_loop(transport.clone(), generation);
        if let Some(old) = self
            .active
            .lock()
            .await
            .replace(ActiveConnection { transport: transport.clone(), events })
        {
            old.events.abort();
            old.transport.close().await;
        }

        let peer = self.negotiation.build_peer(scenario).await?;

        // tracks attach strictly after acquisition and before offer creation
        for track in local.tracks() {
            transport.add_track(track.clone()).await?;
        }

        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        let answer = peer.answer_offer(&offer).await?;
        transport.set_remote_description(answer).await?;

        debug!(peer = %transport.id(), %scenario, "handshake submitted");
        Ok(())
    }

    fn spawn_event_loop(
        &self,
        transport: Arc<dyn PeerTransport>,
        generation: u64,
    ) -> JoinHandle<()> {
        let weak = self.weak();
        let mut events = transport.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(controller) = weak.upgrade() else { break };
                        if controller.is_stale(generation) {
                            break;
                        }
                        controller.on_transport_event(event, generation).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "transport event subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn on_transport_event(&self, event: TransportEvent, generation: u64) {
        match event {
            TransportEvent::TrackReceived(stream) => {
                debug!(stream = %stream.id(), "remote track received");
                self.store.dispatch(SessionEvent::RemoteStreamChanged(Some(stream)));
            }
            TransportEvent::ConnectionStateChanged(state) => {
                debug!(?state, "transport connection state changed");
                if state == crate::transport::PeerConnectionState::Connected {
                    self.retry.on_connected();
                    self.store.dispatch(SessionEvent::StatusChanged(CallStatus::Connected));
                } else if state.is_loss() {
                    self.handle_connection_loss(generation).await;
                }
            }
        }
    }

    /// Shared teardown-and-retry path for organic and injected losses
    async fn handle_connection_loss(&self, generation: u64) {
        if self.is_stale(generation) {
            return;
        }
        self.stop_outbound_tracks().await;
        self.retry.connection_lost().await;
    }

    /// Arm the `connection-drop` fault: stop outbound tracks and close the
    /// connection after the configured delay, then run the loss path
    fn schedule_drop(&self, generation: u64) {
        let weak = self.weak();
        let fault = self.fault;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(fault.drop_after).await;
            let Some(controller) = weak.upgrade() else { return };
            if controller.is_stale(generation) {
                return;
            }
            info!("injecting connection drop");
            {
                let guard = controller.active.lock().await;
                let Some(active) = guard.as_ref() else { return };
                for sender in active.transport.senders() {
                    if let Some(track) = sender.track() {
                        track.stop();
                    }
                }
                active.transport.close().await;
            }
            tokio::time::sleep(fault.settle).await;
            let Some(controller) = weak.upgrade() else { return };
            controller.handle_connection_loss(generation).await;
        });
        if let Some(old) = self
            .fault_task
            .lock()
            .expect("fault task lock poisoned")
            .replace(handle)
        {
            old.abort();
        }
    }

    /// Flip audio mute. The tracks keep running; only their enabled flag and
    /// the settings boolean change.
    pub async fn toggle_audio(&self) -> CallResult<()> {
        self.toggle_tracks(TrackKind::Audio).await
    }

    /// Flip video mute, same contract as [`toggle_audio`](Self::toggle_audio)
    pub async fn toggle_video(&self) -> CallResult<()> {
        self.toggle_tracks(TrackKind::Video).await
    }

    async fn toggle_tracks(&self, kind: TrackKind) -> CallResult<()> {
        let guard = self.active.lock().await;
        let Some(active) = guard.as_ref() else {
            debug!(?kind, "toggle ignored, no active connection");
            return Ok(());
        };

        let settings = self.store.snapshot().settings;
        let enabled = match kind {
            TrackKind::Audio => !settings.audio_enabled,
            TrackKind::Video => !settings.video_enabled,
        };
        for sender in active.transport.senders() {
            if sender.kind() == kind {
                if let Some(track) = sender.track() {
                    track.set_enabled(enabled);
                }
            }
        }
        drop(guard);

        self.store.dispatch(match kind {
            TrackKind::Audio => SessionEvent::ToggleAudio,
            TrackKind::Video => SessionEvent::ToggleVideo,
        });
        info!(?kind, enabled, "toggled media");
        Ok(())
    }

    /// Cycle to the next video input device. A no-op with fewer than two
    /// cameras; replaces the outgoing track in place, no renegotiation.
    pub async fn switch_camera(&self) -> CallResult<()> {
        let guard = self.active.lock().await;
        let Some(active) = guard.as_ref() else {
            debug!("camera switch ignored, no active connection");
            return Ok(());
        };

        let devices = self.media.enumerate_devices().await?;
        let cameras: Vec<_> = devices
            .iter()
            .filter(|d| d.kind == crate::media::MediaDeviceKind::VideoInput)
            .cloned()
            .collect();
        if cameras.len() < 2 {
            debug!(cameras = cameras.len(), "camera switch is a no-op");
            return Ok(());
        }

        let Some(sender) = active
            .transport
            .senders()
            .into_iter()
            .find(|s| s.kind() == TrackKind::Video)
        else {
            return Ok(());
        };
        let Some(current) = sender.track() else { return Ok(()) };

        let current_device = current.device_id();
        let next_index = cameras
            .iter()
            .position(|d| Some(&d.id) == current_device.as_ref())
            .map(|i| (i + 1) % cameras.len())
            .unwrap_or(0);
        let next = cameras[next_index].clone();

        let settings = self.store.snapshot().settings;
        let constraints = MediaConstraints::video_only(next.id.clone(), settings.resolution);
        let fresh = self
            .media
            .get_stream(&constraints)
            .await
            .map_err(CallError::from)?;
        let Some(new_track) = fresh.video_tracks().into_iter().next() else {
            return Err(CallError::internal("camera stream carried no video track"));
        };
        new_track.set_enabled(settings.video_enabled);

        sender.replace_track(Some(new_track));
        current.stop();
        drop(guard);

        let mut settings = settings;
        settings.selected_video_device = Some(next.id.clone());
        self.store.dispatch(SessionEvent::SettingsChanged(settings));
        info!(device = %next.id, "switched camera");
        Ok(())
    }

    /// Re-acquire local media under new constraints and swap the outbound
    /// tracks in place
    pub async fn update_media_constraints(
        &self,
        constraints: &MediaConstraints,
    ) -> CallResult<()> {
        let guard = self.active.lock().await;
        let Some(active) = guard.as_ref() else {
            debug!("constraint update ignored, no active connection");
            return Ok(());
        };

        let fresh = self
            .media
            .get_stream(constraints)
            .await
            .map_err(CallError::from)?;
        let mut settings = self.store.snapshot().settings;
        let senders = active.transport.senders();
        for new_track in fresh.tracks() {
            // fresh tracks keep mirroring the mute settings
            match new_track.kind() {
                TrackKind::Audio => new_track.set_enabled(settings.audio_enabled),
                TrackKind::Video => new_track.set_enabled(settings.video_enabled),
            }
            if let Some(sender) = senders.iter().find(|s| s.kind() == new_track.kind()) {
                let old = sender.track();
                sender.replace_track(Some(new_track.clone()));
                if let Some(old) = old {
                    old.stop();
                }
            }
        }
        drop(guard);

        if constraints.audio_device.is_some() {
            settings.selected_audio_device = constraints.audio_device.clone();
        }
        if constraints.video_device.is_some() {
            settings.selected_video_device = constraints.video_device.clone();
        }
        settings.resolution = constraints.resolution;
        self.store.dispatch(SessionEvent::SettingsChanged(settings));
        self.store.dispatch(SessionEvent::LocalStreamChanged(Some(fresh)));
        info!("updated media constraints");
        Ok(())
    }

    /// End the call: cancel pending retries and faults, stop outbound
    /// tracks, close the transport, release the negotiation session and
    /// settle on `disconnected`. Idempotent.
    pub async fn end_call(&self) -> CallResult<()> {
        let _ops = self.ops.lock().await;

        info!("ending call");
        self.next_generation();
        if let Some(fault) = self.fault_task.lock().expect("fault task lock poisoned").take() {
            fault.abort();
        }
        self.retry.cancel();

        if let Some(active) = self.active.lock().await.take() {
            active.events.abort();
            for sender in active.transport.senders() {
                if let Some(track) = sender.track() {
                    track.stop();
                }
            }
            active.transport.close().await;
        }
        if let Some(local) = self.store.snapshot().local_stream {
            local.stop_all();
        }

        // teardown proceeds even if the signaling side misbehaves
        if let Err(error) = self.negotiation.shutdown().await {
            warn!(error = %error, "negotiation shutdown failed");
        }

        self.store.dispatch(SessionEvent::RetryCleared);
        self.store.dispatch(SessionEvent::CallEnded);
        Ok(())
    }

    /// Tear down the dead connection after the retry orchestrator gives up:
    /// stop everything, close the transport, drop the session's handles.
    ///
    /// May run on the transport's own event task, so the task is not aborted
    /// here; it ends on its own once the transport's event channel closes.
    pub(crate) async fn release_transport(&self) {
        if let Some(active) = self.active.lock().await.take() {
            for sender in active.transport.senders() {
                if let Some(track) = sender.track() {
                    track.stop();
                }
            }
            active.transport.close().await;
        }
        if let Some(local) = self.store.snapshot().local_stream {
            local.stop_all();
        }
        self.store.dispatch(SessionEvent::LocalStreamChanged(None));
        self.store.dispatch(SessionEvent::RemoteStreamChanged(None));
        self.store.dispatch(SessionEvent::PeerConnectionChanged(None));
    }

    async fn stop_outbound_tracks(&self) {
        let guard = self.active.lock().await;
        if let Some(active) = guard.as_ref() {
            for sender in active.transport.senders() {
                if let Some(track) = sender.track() {
                    track.stop();
                }
            }
        }
    }

    async fn cleanup_failed_setup(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.events.abort();
            for sender in active.transport.senders() {
                if let Some(track) = sender.track() {
                    track.stop();
                }
            }
            active.transport.close().await;
        }
        if let Some(local) = self.store.snapshot().local_stream {
            local.stop_all();
        }
        self.store.dispatch(SessionEvent::LocalStreamChanged(None));
        self.store.dispatch(SessionEvent::PeerConnectionChanged(None));
        let scenario = *self.scenario.lock().expect("scenario lock poisoned");
        self.store.dispatch(SessionEvent::ScenarioChanged(ScenarioState {
            kind: scenario,
            active: false,
        }));
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn weak(&self) -> Weak<ConnectionController> {
        self.weak_self
            .get()
            .cloned()
            .expect("weak self set at construction")
    }
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("fault", &self.fault)
            .finish()
    }
}
