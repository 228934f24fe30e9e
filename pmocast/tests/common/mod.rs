//! In-memory receiver shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use pmocast::{
    ApplicationSession, CastChannel, CastConnector, CastError, DEFAULT_MEDIA_RECEIVER_APP_ID,
    Device, LoadId, LoadRequest, MediaStatus, PlayerState, QueueLoadOutcome, SessionConfig,
    SessionEvent, SessionState, TrackDescriptor,
};

pub const WAIT: Duration = Duration::from_secs(5);
pub const MEDIA_SESSION_ID: i64 = 7;

/// Every receiver-bound call the fake saw.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Connect(String),
    Launch(String),
    Load(LoadRequest),
    MediaStatus,
    Play(i64),
    Pause(i64),
    Stop(String),
    Close,
}

/// Blocks a step until released (the sender is dropped or signalled).
#[derive(Default)]
pub struct Gate(Mutex<Option<Receiver<()>>>);

impl Gate {
    pub fn close(&self) -> Sender<()> {
        let (tx, rx) = unbounded();
        *self.0.lock().unwrap() = Some(rx);
        tx
    }

    fn pass(&self) {
        let gate = self.0.lock().unwrap().clone();
        if let Some(rx) = gate {
            let _ = rx.recv();
        }
    }
}

#[derive(Default)]
pub struct Behaviour {
    pub connect_gate: Gate,
    pub launch_gate: Gate,
    pub load_gate: Gate,
    pub connect_fails: AtomicBool,
    pub launch_fails: AtomicBool,
    pub load_transport_error: AtomicBool,
    pub load_rejected: AtomicBool,
}

struct Shared {
    calls: Sender<Call>,
    behaviour: Behaviour,
    player_state: Mutex<PlayerState>,
}

pub struct FakeReceiver {
    shared: Arc<Shared>,
    pub calls: Receiver<Call>,
}

impl FakeReceiver {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                calls: tx,
                behaviour: Behaviour::default(),
                player_state: Mutex::new(PlayerState::Idle),
            }),
            calls: rx,
        }
    }

    pub fn behaviour(&self) -> &Behaviour {
        &self.shared.behaviour
    }

    pub fn connector(&self) -> Arc<dyn CastConnector> {
        Arc::new(FakeConnector {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Waits for the next call matching `predicate`, skipping the others.
    pub fn expect_call<F>(&self, predicate: F) -> Call
    where
        F: Fn(&Call) -> bool,
    {
        loop {
            match self.calls.recv_timeout(WAIT) {
                Ok(call) if predicate(&call) => return call,
                Ok(_) => continue,
                Err(e) => panic!("expected call never came: {}", e),
            }
        }
    }

    pub fn drain_calls(&self) -> Vec<Call> {
        self.calls.try_iter().collect()
    }
}

struct FakeConnector {
    shared: Arc<Shared>,
}

impl CastConnector for FakeConnector {
    fn connect(&self, device: &Device) -> Result<Arc<dyn CastChannel>, CastError> {
        let _ = self.shared.calls.send(Call::Connect(device.id.0.clone()));
        self.shared.behaviour.connect_gate.pass();
        if self.shared.behaviour.connect_fails.load(Ordering::SeqCst) {
            return Err(CastError::transport("connection refused"));
        }
        Ok(Arc::new(FakeChannel {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeChannel {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl FakeChannel {
    fn status(&self) -> MediaStatus {
        MediaStatus {
            media_session_id: Some(MEDIA_SESSION_ID),
            player_state: *self.shared.player_state.lock().unwrap(),
        }
    }

    fn set_state(&self, state: PlayerState) -> MediaStatus {
        *self.shared.player_state.lock().unwrap() = state;
        self.status()
    }
}

impl CastChannel for FakeChannel {
    fn launch_application(&self, app_id: &str) -> Result<ApplicationSession, CastError> {
        let _ = self.shared.calls.send(Call::Launch(app_id.to_string()));
        self.shared.behaviour.launch_gate.pass();
        if self.shared.behaviour.launch_fails.load(Ordering::SeqCst) {
            return Err(CastError::receiver("LAUNCH: LAUNCH_ERROR (NOT_FOUND)"));
        }
        Ok(ApplicationSession {
            app_id: app_id.to_string(),
            session_id: "session-1".to_string(),
            transport_id: "web-1".to_string(),
        })
    }

    fn load(
        &self,
        _session: &ApplicationSession,
        request: &LoadRequest,
    ) -> Result<MediaStatus, CastError> {
        // Same refusal as the real channel, before anything is sent.
        pmocast::cast::check_request_size(request)?;
        let _ = self.shared.calls.send(Call::Load(request.clone()));
        self.shared.behaviour.load_gate.pass();
        if self.shared.behaviour.load_transport_error.load(Ordering::SeqCst) {
            return Err(CastError::transport("connection reset"));
        }
        if self.shared.behaviour.load_rejected.load(Ordering::SeqCst) {
            return Err(CastError::receiver("LOAD: LOAD_FAILED"));
        }
        Ok(self.set_state(PlayerState::Playing))
    }

    fn media_status(&self, _session: &ApplicationSession) -> Result<Option<MediaStatus>, CastError> {
        let _ = self.shared.calls.send(Call::MediaStatus);
        Ok(Some(self.status()))
    }

    fn play(&self, _session: &ApplicationSession, media_session_id: i64) -> Result<MediaStatus, CastError> {
        let _ = self.shared.calls.send(Call::Play(media_session_id));
        Ok(self.set_state(PlayerState::Playing))
    }

    fn pause(&self, _session: &ApplicationSession, media_session_id: i64) -> Result<MediaStatus, CastError> {
        let _ = self.shared.calls.send(Call::Pause(media_session_id));
        Ok(self.set_state(PlayerState::Paused))
    }

    fn stop_application(&self, session: &ApplicationSession) -> Result<(), CastError> {
        let _ = self.shared.calls.send(Call::Stop(session.session_id.clone()));
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shared.calls.send(Call::Close);
        }
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        receiver_app_id: DEFAULT_MEDIA_RECEIVER_APP_ID.to_string(),
        connect_timeout: Duration::from_secs(5),
        launch_timeout: Duration::from_secs(5),
    }
}

pub fn device(id: &str) -> Device {
    Device::new(id, format!("Receiver {}", id), "127.0.0.1", 8009)
}

pub fn track(id: &str) -> TrackDescriptor {
    TrackDescriptor {
        id: id.to_string(),
        track_name: format!("Track {}", id),
        artist_name: "Artist".to_string(),
        album_name: "Album".to_string(),
        image_url: format!("http://img.example/{}/600x600bb.jpg", id),
        image_height: 600,
        preview_url: format!("http://audio.example/{}.m4a", id),
        duration_secs: 30.0,
        content_type: "audio/x-m4a".to_string(),
    }
}

/// Collects state transitions until `target` is reached.
pub fn wait_for_state(events: &Receiver<SessionEvent>, target: SessionState) -> Vec<SessionState> {
    let mut path = Vec::new();
    loop {
        match events.recv_timeout(WAIT) {
            Ok(SessionEvent::StateChanged { to, .. }) => {
                path.push(to);
                if to == target {
                    return path;
                }
            }
            Ok(_) => continue,
            Err(e) => panic!("state {} never reached (saw {:?}): {}", target, path, e),
        }
    }
}

pub fn next_load_result(events: &Receiver<SessionEvent>) -> (LoadId, QueueLoadOutcome) {
    loop {
        match events.recv_timeout(WAIT) {
            Ok(SessionEvent::QueueLoadResult { load_id, outcome }) => return (load_id, outcome),
            Ok(_) => continue,
            Err(e) => panic!("no load result: {}", e),
        }
    }
}
