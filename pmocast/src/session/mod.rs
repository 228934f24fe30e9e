//! Session lifecycle with one receiver.
//!
//! ```text
//! Idle → Connecting → DeviceConnected → ApplicationLaunching → Active
//!            ╰──────────────┴───────────────────┴──────────────┴──→ Disconnected
//! ```
//!
//! [`SessionController`] is the handle; the state itself lives on the
//! `pmocast-session` thread. Every transition is published as a
//! [`SessionEvent::StateChanged`] and mirrored in [`SessionController::state`]
//! before the event goes out.

pub(crate) mod actor;
pub mod state;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::warn;

pub use state::{SessionState, StateCell};

use crate::cast::{ApplicationSession, CastConnector, DEFAULT_MEDIA_RECEIVER_APP_ID};
use crate::errors::CastError;
use crate::events::EventBus;
use crate::model::{Device, SessionEvent};
use crate::queue::QueueDispatcher;
use actor::{Command, SessionActor};

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub receiver_app_id: String,
    /// Bounds `Connecting`.
    pub connect_timeout: Duration,
    /// Bounds `DeviceConnected` and `ApplicationLaunching` together.
    pub launch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receiver_app_id: DEFAULT_MEDIA_RECEIVER_APP_ID.to_string(),
            connect_timeout: Duration::from_secs(10),
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// What the connected callback is handed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveSession {
    pub device: Device,
    pub application: ApplicationSession,
}

/// Fired once, on the session thread, when the session becomes `Active`.
///
/// A panic in the callback is caught and logged; the session stays `Active`.
pub type ConnectedCallback = Box<dyn FnOnce(&ActiveSession) + Send>;

pub struct SessionController {
    commands: Sender<Command>,
    state: StateCell,
    events: EventBus<SessionEvent>,
    dispatcher: QueueDispatcher,
    handle: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn spawn(config: SessionConfig, connector: Arc<dyn CastConnector>) -> Result<Self, CastError> {
        let (commands, inbox) = unbounded();
        let state = StateCell::default();
        let events = EventBus::new();

        let actor = SessionActor::new(
            config,
            connector,
            commands.clone(),
            state.clone(),
            events.clone(),
        );
        let handle = thread::Builder::new()
            .name("pmocast-session".into())
            .spawn(move || actor.run(inbox))?;

        Ok(Self {
            dispatcher: QueueDispatcher::new(commands.clone(), state.clone()),
            commands,
            state,
            events,
            handle: Some(handle),
        })
    }

    fn send(&self, command: Command) -> Result<(), CastError> {
        self.commands
            .send(command)
            .map_err(|_| CastError::ControllerStopped)
    }

    /// Starts a session with `device`.
    ///
    /// A session in progress is disconnected first, as by [`disconnect`](Self::disconnect):
    /// observers see it pass through `Disconnected` and `Idle` before
    /// `Connecting`. `on_connected` replaces
    /// any callback registered by an earlier, unfinished `connect`.
    pub fn connect(&self, device: Device, on_connected: Option<ConnectedCallback>) -> Result<(), CastError> {
        self.send(Command::Connect {
            device,
            on_connected,
        })
    }

    pub fn disconnect(&self) -> Result<(), CastError> {
        self.send(Command::Disconnect)
    }

    /// Pauses the receiver when it plays, resumes it otherwise.
    pub fn toggle_playback(&self) -> Result<(), CastError> {
        self.send(Command::TogglePlayback)
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn dispatcher(&self) -> QueueDispatcher {
        self.dispatcher.clone()
    }

    /// Releases the session, if any, and waits for the session thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!("Session thread panicked");
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}
