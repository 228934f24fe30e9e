//! [`CastChannel`] on top of rust_cast.
//!
//! A `CastDevice` cannot leave the thread that opened it, so every
//! connection gets its own thread owning the device. Calls are shipped to it
//! as jobs and their results come back on a one-shot channel.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::{CastDevice, ChannelMessage};
use tracing::{debug, trace, warn};

use crate::cast::wire;
use crate::cast::{ApplicationSession, CastChannel, CastConnector, MediaStatus, PlayerState};
use crate::errors::CastError;
use crate::model::Device;
use crate::queue::LoadRequest;

/// Platform endpoint every sender talks to before joining an application.
const PLATFORM_RECEIVER_ID: &str = "receiver-0";

static CRYPTO_PROVIDER: Once = Once::new();

/// rust_cast builds its TLS config from the process-wide provider.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::CryptoProvider::install_default(
            rustls::crypto::aws_lc_rs::default_provider(),
        )
        .is_err()
        {
            debug!("A rustls crypto provider was already installed");
        }
    });
}

#[derive(Clone, Debug)]
pub struct ChannelSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// Opens Cast control channels to real receivers.
pub struct RustCastConnector {
    settings: ChannelSettings,
}

impl RustCastConnector {
    pub fn new(settings: ChannelSettings) -> Self {
        install_crypto_provider();
        Self { settings }
    }
}

impl CastConnector for RustCastConnector {
    fn connect(&self, device: &Device) -> Result<Arc<dyn CastChannel>, CastError> {
        let channel = RustCastChannel::open(device, &self.settings)?;
        Ok(Arc::new(channel))
    }
}

type Job = Box<dyn FnOnce(&CastDevice<'static>) + Send>;

enum Request {
    Run(Job),
    Close,
}

fn open_device(host: String, port: u16) -> Result<CastDevice<'static>, CastError> {
    let device = CastDevice::connect_without_host_verification(host, port)?;
    device.connection.connect(PLATFORM_RECEIVER_ID)?;
    device.heartbeat.ping()?;
    Ok(device)
}

/// Pings and reads until the PONG, answering the receiver's own PINGs.
///
/// Reading also drains what rust_cast buffered while waiting for earlier
/// replies (status broadcasts nobody asked for).
fn heartbeat(device: &CastDevice<'static>) -> Result<(), CastError> {
    device.heartbeat.ping()?;
    loop {
        match device.receive()? {
            ChannelMessage::Heartbeat(HeartbeatResponse::Pong) => return Ok(()),
            ChannelMessage::Heartbeat(HeartbeatResponse::Ping) => device.heartbeat.pong()?,
            other => trace!(message = ?other, "Unsolicited cast message dropped"),
        }
    }
}

fn device_loop(device: CastDevice<'static>, requests: Receiver<Request>, heartbeat_interval: Duration) {
    loop {
        match requests.recv_timeout(heartbeat_interval) {
            Ok(Request::Run(job)) => job(&device),
            Ok(Request::Close) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = heartbeat(&device) {
                    warn!("Cast heartbeat failed, closing connection: {}", e);
                    break;
                }
            }
        }
    }

    if let Err(e) = device.connection.disconnect(PLATFORM_RECEIVER_ID) {
        debug!("Cast CLOSE not delivered: {}", e);
    }
    debug!("Cast connection closed");
}

fn idle_status() -> MediaStatus {
    MediaStatus {
        media_session_id: None,
        player_state: PlayerState::Idle,
    }
}

fn wire_media_session_id(media_session_id: i64) -> Result<i32, CastError> {
    i32::try_from(media_session_id)
        .map_err(|_| CastError::protocol(format!("media session id {} out of range", media_session_id)))
}

pub struct RustCastChannel {
    requests: Sender<Request>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl RustCastChannel {
    fn open(device: &Device, settings: &ChannelSettings) -> Result<Self, CastError> {
        let host = device.host.clone();
        let port = device.port;
        let heartbeat_interval = settings.heartbeat_interval;
        let (requests_tx, requests_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded::<Result<(), CastError>>(1);

        debug!(device = %device.friendly_name, address = %device.address(), "Opening cast channel");
        thread::Builder::new()
            .name(format!("pmocast-cast-{}", device.id))
            .spawn(move || {
                let device = match open_device(host, port) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Plus personne n'attend : connexion ouverte trop tard.
                if ready_tx.send(Ok(())).is_err() {
                    let _ = device.connection.disconnect(PLATFORM_RECEIVER_ID);
                    return;
                }
                device_loop(device, requests_rx, heartbeat_interval);
            })
            .map_err(|e| CastError::transport(format!("cannot spawn cast thread: {}", e)))?;

        match ready_rx.recv_timeout(settings.connect_timeout) {
            Ok(Ok(())) => Ok(Self {
                requests: requests_tx,
                request_timeout: settings.request_timeout,
                closed: AtomicBool::new(false),
            }),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Err(CastError::Timeout("connection".into())),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CastError::transport("cast thread exited during connection"))
            }
        }
    }

    /// Runs `op` on the device thread and waits for its result.
    ///
    /// A panic inside rust_cast (a receiver status without the expected
    /// entries) is reported as a receiver error.
    fn call<T, F>(&self, what: &'static str, op: F) -> Result<T, CastError>
    where
        T: Send + 'static,
        F: FnOnce(&CastDevice<'static>) -> Result<T, CastError> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CastError::transport("channel is closed"));
        }

        let (reply_tx, reply_rx) = bounded(1);
        let job: Job = Box::new(move |device| {
            trace!(request = what, "→ cast");
            let result = catch_unwind(AssertUnwindSafe(|| op(device))).unwrap_or_else(|_| {
                Err(CastError::receiver(format!("{}: unexpected answer", what)))
            });
            let _ = reply_tx.send(result);
        });
        self.requests
            .send(Request::Run(job))
            .map_err(|_| CastError::transport(format!("{}: cast connection is gone", what)))?;

        match reply_rx.recv_timeout(self.request_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CastError::Timeout(what.to_string())),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CastError::transport(format!("{}: cast connection is gone", what)))
            }
        }
    }
}

impl CastChannel for RustCastChannel {
    fn launch_application(&self, app_id: &str) -> Result<ApplicationSession, CastError> {
        let app = CastDeviceApp::from_str(app_id)
            .unwrap_or_else(|_| CastDeviceApp::Custom(app_id.to_string()));

        let session = self.call("LAUNCH", move |device| {
            let application = device.receiver.launch_app(&app)?;
            device.connection.connect(application.transport_id.clone())?;
            Ok(ApplicationSession {
                app_id: application.app_id,
                session_id: application.session_id,
                transport_id: application.transport_id,
            })
        })?;
        debug!(app_id, session_id = %session.session_id, "Joined receiver application");
        Ok(session)
    }

    fn load(
        &self,
        session: &ApplicationSession,
        request: &LoadRequest,
    ) -> Result<MediaStatus, CastError> {
        wire::check_request_size(request)?;

        let transport_id = session.transport_id.clone();
        let session_id = session.session_id.clone();
        let status = match request {
            LoadRequest::Queue(queue) => {
                let queue = wire::media_queue(queue)?;
                self.call("QUEUE_LOAD", move |device| {
                    Ok(device.media.load_queue(transport_id, session_id, &queue)?)
                })?
            }
            LoadRequest::Media(media) => {
                let media = wire::media(media);
                self.call("LOAD", move |device| {
                    Ok(device.media.load(transport_id, session_id, &media)?)
                })?
            }
        };
        Ok(status.entries.first().map(MediaStatus::from).unwrap_or_else(idle_status))
    }

    fn media_status(&self, session: &ApplicationSession) -> Result<Option<MediaStatus>, CastError> {
        let transport_id = session.transport_id.clone();
        let status = self.call("GET_STATUS", move |device| {
            Ok(device.media.get_status(transport_id, None)?)
        })?;
        Ok(status.entries.first().map(MediaStatus::from))
    }

    fn play(&self, session: &ApplicationSession, media_session_id: i64) -> Result<MediaStatus, CastError> {
        let transport_id = session.transport_id.clone();
        let media_session_id = wire_media_session_id(media_session_id)?;
        let entry = self.call("PLAY", move |device| {
            Ok(device.media.play(transport_id, media_session_id)?)
        })?;
        Ok(MediaStatus::from(&entry))
    }

    fn pause(&self, session: &ApplicationSession, media_session_id: i64) -> Result<MediaStatus, CastError> {
        let transport_id = session.transport_id.clone();
        let media_session_id = wire_media_session_id(media_session_id)?;
        let entry = self.call("PAUSE", move |device| {
            Ok(device.media.pause(transport_id, media_session_id)?)
        })?;
        Ok(MediaStatus::from(&entry))
    }

    fn stop_application(&self, session: &ApplicationSession) -> Result<(), CastError> {
        let session_id = session.session_id.clone();
        let transport_id = session.transport_id.clone();
        self.call("STOP", move |device| {
            device.receiver.stop_app(session_id)?;
            device.connection.disconnect(transport_id)?;
            Ok(())
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Le thread peut être bloqué dans une lecture : il verra Close ensuite.
        let _ = self.requests.send(Request::Close);
    }
}

impl Drop for RustCastChannel {
    fn drop(&mut self) {
        self.close();
    }
}
