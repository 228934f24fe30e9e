//! The session actor.
//!
//! One thread owns every piece of session state and consumes a single
//! command channel. API calls and network completions both arrive there;
//! network work itself runs on short-lived worker threads that post their
//! result back tagged with the attempt it belongs to. A result whose
//! attempt is not the current one is stale and dropped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::cast::{ApplicationSession, CastChannel, CastConnector, MediaStatus};
use crate::errors::CastError;
use crate::events::EventBus;
use crate::model::{Device, LoadId, QueueLoadOutcome, SessionEvent};
use crate::queue::LoadRequest;
use crate::session::state::{SessionState, StateCell};
use crate::session::{ActiveSession, ConnectedCallback, SessionConfig};

pub(crate) enum Command {
    Connect {
        device: Device,
        on_connected: Option<ConnectedCallback>,
    },
    Disconnect,
    Load {
        load_id: LoadId,
        request: LoadRequest,
    },
    TogglePlayback,
    Shutdown,

    TransportUp {
        attempt: u64,
        channel: Arc<dyn CastChannel>,
    },
    TransportFailed {
        attempt: u64,
        error: CastError,
    },
    ApplicationJoined {
        attempt: u64,
        application: ApplicationSession,
    },
    LaunchFailed {
        attempt: u64,
        error: CastError,
    },
    LoadFinished {
        attempt: u64,
        load_id: LoadId,
        result: Result<MediaStatus, CastError>,
    },
    PlaybackToggled {
        attempt: u64,
        result: Result<MediaStatus, CastError>,
    },
}

pub(crate) struct SessionActor {
    config: SessionConfig,
    connector: Arc<dyn CastConnector>,
    commands: Sender<Command>,
    state: StateCell,
    events: EventBus<SessionEvent>,

    current: SessionState,
    attempt: u64,
    deadline: Option<Instant>,
    device: Option<Device>,
    channel: Option<Arc<dyn CastChannel>>,
    application: Option<ApplicationSession>,
    on_connected: Option<ConnectedCallback>,
    pending_load: Option<LoadId>,
    media_session_id: Option<i64>,
}

impl SessionActor {
    pub(crate) fn new(
        config: SessionConfig,
        connector: Arc<dyn CastConnector>,
        commands: Sender<Command>,
        state: StateCell,
        events: EventBus<SessionEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            commands,
            state,
            events,
            current: SessionState::Idle,
            attempt: 0,
            deadline: None,
            device: None,
            channel: None,
            application: None,
            on_connected: None,
            pending_load: None,
            media_session_id: None,
        }
    }

    pub(crate) fn run(mut self, inbox: Receiver<Command>) {
        debug!("Session actor started");
        loop {
            let command = match self.deadline {
                Some(deadline) => match inbox.recv_deadline(deadline) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => {
                        self.handshake_timed_out();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match inbox.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if !self.handle(command) {
                break;
            }
        }

        if self.current.is_engaged() {
            self.teardown(true);
        }
        debug!("Session actor stopped");
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Connect {
                device,
                on_connected,
            } => self.connect(device, on_connected),
            Command::Disconnect => self.disconnect(),
            Command::Load { load_id, request } => self.load(load_id, request),
            Command::TogglePlayback => self.toggle_playback(),
            Command::Shutdown => return false,

            Command::TransportUp { attempt, channel } => self.transport_up(attempt, channel),
            Command::TransportFailed { attempt, error } => {
                if self.is_current(attempt, SessionState::Connecting) {
                    self.fail(error);
                } else {
                    debug!(attempt, "Stale transport failure discarded: {}", error);
                }
            }
            Command::ApplicationJoined {
                attempt,
                application,
            } => self.application_joined(attempt, application),
            Command::LaunchFailed { attempt, error } => {
                if self.is_current(attempt, SessionState::ApplicationLaunching) {
                    self.fail(error);
                } else {
                    debug!(attempt, "Stale launch failure discarded: {}", error);
                }
            }
            Command::LoadFinished {
                attempt,
                load_id,
                result,
            } => self.load_finished(attempt, load_id, result),
            Command::PlaybackToggled { attempt, result } => self.playback_toggled(attempt, result),
        }
        true
    }

    fn is_current(&self, attempt: u64, expected: SessionState) -> bool {
        attempt == self.attempt && self.current == expected
    }

    fn transition(&mut self, next: SessionState) {
        let from = self.current;
        if from == next {
            return;
        }
        if !from.can_transition_to(next) {
            warn!(%from, to = %next, "Unexpected session transition");
        }
        self.current = next;
        // L'instantané partagé précède l'évènement et le callback.
        self.state.set(next);
        debug!(%from, to = %next, "Session state changed");
        self.events
            .broadcast(SessionEvent::StateChanged { from, to: next });
    }

    fn report_load(&self, load_id: LoadId, outcome: QueueLoadOutcome) {
        self.events
            .broadcast(SessionEvent::QueueLoadResult { load_id, outcome });
    }

    /// Runs `job` on a worker thread and posts its command back.
    fn spawn_worker<F>(&self, name: &str, job: F) -> Result<(), CastError>
    where
        F: FnOnce() -> Command + Send + 'static,
    {
        let commands = self.commands.clone();
        thread::Builder::new()
            .name(format!("pmocast-{}", name))
            .spawn(move || {
                let _ = commands.send(job());
            })
            .map(|_| ())
            .map_err(|e| CastError::transport(format!("cannot spawn {} worker: {}", name, e)))
    }

    fn connect(&mut self, device: Device, on_connected: Option<ConnectedCallback>) {
        if !self.current.accepts_connect() {
            info!(state = %self.current, "Session busy, disconnecting before the new connection");
            self.teardown(true);
            self.transition(SessionState::Idle);
        }

        self.attempt += 1;
        let attempt = self.attempt;
        self.device = Some(device.clone());
        self.on_connected = on_connected;
        self.media_session_id = None;
        self.transition(SessionState::Connecting);
        self.deadline = Some(Instant::now() + self.config.connect_timeout);
        info!(device = %device.id, name = %device.friendly_name, address = %device.address(), "Connecting to cast receiver");

        let connector = Arc::clone(&self.connector);
        let spawned = self.spawn_worker("connect", move || match connector.connect(&device) {
            Ok(channel) => Command::TransportUp { attempt, channel },
            Err(error) => Command::TransportFailed { attempt, error },
        });
        if let Err(e) = spawned {
            self.fail(e);
        }
    }

    fn transport_up(&mut self, attempt: u64, channel: Arc<dyn CastChannel>) {
        if !self.is_current(attempt, SessionState::Connecting) {
            debug!(attempt, "Stale cast channel closed");
            channel.close();
            return;
        }

        self.channel = Some(Arc::clone(&channel));
        self.transition(SessionState::DeviceConnected);
        info!("Cast receiver connected");

        self.deadline = Some(Instant::now() + self.config.launch_timeout);
        self.transition(SessionState::ApplicationLaunching);

        let app_id = self.config.receiver_app_id.clone();
        let spawned = self.spawn_worker("launch", move || {
            match channel.launch_application(&app_id) {
                Ok(application) => Command::ApplicationJoined {
                    attempt,
                    application,
                },
                Err(error) => Command::LaunchFailed { attempt, error },
            }
        });
        if let Err(e) = spawned {
            self.fail(e);
        }
    }

    fn application_joined(&mut self, attempt: u64, application: ApplicationSession) {
        if !self.is_current(attempt, SessionState::ApplicationLaunching) {
            debug!(attempt, session_id = %application.session_id, "Stale application join discarded");
            return;
        }

        self.deadline = None;
        self.application = Some(application.clone());
        self.transition(SessionState::Active);
        info!(app_id = %application.app_id, session_id = %application.session_id, "Receiver application joined");

        let callback = self.on_connected.take();
        if let (Some(callback), Some(device)) = (callback, self.device.clone()) {
            let session = ActiveSession {
                device,
                application,
            };
            // Un callback qui panique ne doit pas emporter le thread de session.
            if catch_unwind(AssertUnwindSafe(|| callback(&session))).is_err() {
                warn!(device = %session.device.id, "Connected callback panicked");
            }
        }
    }

    fn handshake_timed_out(&mut self) {
        self.deadline = None;
        let stage = self.current.to_string();
        warn!(state = %stage, "Cast handshake timed out");
        self.fail(CastError::Timeout(stage));
    }

    /// Tears the session down after an error; rests in `Disconnected`.
    fn fail(&mut self, error: CastError) {
        warn!(state = %self.current, "Cast session lost: {}", error);
        self.teardown(!error.is_transport());
    }

    /// Drops every trace of the current attempt and moves to `Disconnected`.
    ///
    /// The application is stopped only when the channel is believed usable.
    fn teardown(&mut self, release_application: bool) {
        self.attempt += 1;
        self.deadline = None;
        self.on_connected = None;
        self.media_session_id = None;

        if let Some(load_id) = self.pending_load.take() {
            debug!(%load_id, "Pending load cancelled");
            self.report_load(load_id, QueueLoadOutcome::Cancelled);
        }

        let application = self.application.take();
        if let Some(channel) = self.channel.take() {
            let release = move || {
                if let Some(application) = application.filter(|_| release_application) {
                    if let Err(e) = channel.stop_application(&application) {
                        debug!("Receiver application not stopped: {}", e);
                    }
                }
                channel.close();
            };
            if let Err(e) = thread::Builder::new()
                .name("pmocast-release".into())
                .spawn(release)
            {
                warn!("Cannot spawn release worker: {}", e);
            }
        }

        if self.current.is_engaged() {
            self.transition(SessionState::Disconnected);
        }
    }

    fn disconnect(&mut self) {
        match self.current {
            SessionState::Idle => debug!("Disconnect while idle ignored"),
            SessionState::Disconnected => {
                self.on_connected = None;
                self.transition(SessionState::Idle);
            }
            _ => {
                info!(state = %self.current, "Disconnecting from cast receiver");
                self.teardown(true);
                self.transition(SessionState::Idle);
            }
        }
        self.device = None;
    }

    fn active_parts(&self) -> Option<(Arc<dyn CastChannel>, ApplicationSession)> {
        if !self.current.is_active() {
            return None;
        }
        match (&self.channel, &self.application) {
            (Some(channel), Some(application)) => Some((Arc::clone(channel), application.clone())),
            _ => None,
        }
    }

    fn load(&mut self, load_id: LoadId, request: LoadRequest) {
        let Some((channel, application)) = self.active_parts() else {
            warn!(%load_id, state = %self.current, "Cast receiver not connected on playback attempt");
            self.report_load(
                load_id,
                QueueLoadOutcome::Rejected(format!("session is {}", self.current)),
            );
            return;
        };

        if let Some(previous) = self.pending_load.replace(load_id) {
            debug!(%previous, %load_id, "Pending load superseded");
            self.report_load(previous, QueueLoadOutcome::Superseded);
        }

        let attempt = self.attempt;
        info!(%load_id, items = request.item_count(), "Loading media on receiver");
        let spawned = self.spawn_worker("load", move || Command::LoadFinished {
            attempt,
            load_id,
            result: channel.load(&application, &request),
        });
        if let Err(e) = spawned {
            self.pending_load = None;
            self.report_load(load_id, QueueLoadOutcome::Failed(e.to_string()));
        }
    }

    fn load_finished(&mut self, attempt: u64, load_id: LoadId, result: Result<MediaStatus, CastError>) {
        if attempt != self.attempt || self.pending_load != Some(load_id) {
            debug!(%load_id, "Stale load completion discarded");
            return;
        }
        self.pending_load = None;

        match result {
            Ok(status) => {
                info!(%load_id, media_session_id = ?status.media_session_id, "Media loaded");
                self.media_session_id = status.media_session_id.or(self.media_session_id);
                self.report_load(
                    load_id,
                    QueueLoadOutcome::Loaded {
                        media_session_id: status.media_session_id,
                    },
                );
            }
            Err(error) => {
                warn!(%load_id, "Media load failed: {}", error);
                self.report_load(load_id, QueueLoadOutcome::Failed(error.to_string()));
                if error.is_transport() {
                    self.fail(error);
                }
            }
        }
    }

    fn toggle_playback(&mut self) {
        let Some((channel, application)) = self.active_parts() else {
            warn!(state = %self.current, "Cast receiver not connected on playback attempt");
            return;
        };

        let attempt = self.attempt;
        let known = self.media_session_id;
        let spawned = self.spawn_worker("toggle", move || Command::PlaybackToggled {
            attempt,
            result: toggle(channel.as_ref(), &application, known),
        });
        if let Err(e) = spawned {
            warn!("Playback toggle not sent: {}", e);
        }
    }

    fn playback_toggled(&mut self, attempt: u64, result: Result<MediaStatus, CastError>) {
        if attempt != self.attempt {
            debug!("Stale playback toggle discarded");
            return;
        }
        match result {
            Ok(status) => {
                self.media_session_id = status.media_session_id.or(self.media_session_id);
                debug!(state = ?status.player_state, "Playback toggled");
                self.events.broadcast(SessionEvent::PlaybackToggled {
                    state: status.player_state,
                });
            }
            Err(error) if error.is_transport() => self.fail(error),
            Err(error) => warn!("Playback toggle refused: {}", error),
        }
    }
}

/// Pauses when the receiver is playing, plays otherwise.
fn toggle(
    channel: &dyn CastChannel,
    application: &ApplicationSession,
    known_media_session: Option<i64>,
) -> Result<MediaStatus, CastError> {
    let status = channel.media_status(application)?;
    let media_session_id = status
        .as_ref()
        .and_then(|status| status.media_session_id)
        .or(known_media_session)
        .ok_or_else(|| CastError::receiver("PLAY/PAUSE: no media loaded"))?;

    match status {
        Some(status) if status.player_state.is_playing() => {
            channel.pause(application, media_session_id)
        }
        _ => channel.play(application, media_session_id),
    }
}
