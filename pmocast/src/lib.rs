//! # pmocast
//!
//! Sender side of a Google Cast session: discovers receivers, connects to
//! one, launches the media receiver application and loads an ordered queue
//! of tracks onto it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pmocast::{
//!     CastConfig, DeviceScanner, JsonTrackProvider, MdnsDiscoveryBackend, SessionController,
//!     RustCastConnector, TrackProvider, build_queue_entries,
//! };
//!
//! let config = CastConfig::load(None)?;
//! let tracks = JsonTrackProvider::from_file("tracks.json").tracks()?;
//!
//! let mut scanner = DeviceScanner::new(Box::new(MdnsDiscoveryBackend::new(config.mdns_settings())));
//! scanner.start_discovery(config.discovery_filter())?;
//!
//! let connector = Arc::new(RustCastConnector::new(config.channel_settings()));
//! let controller = SessionController::spawn(config.session_config(), connector)?;
//!
//! if let Some(device) = scanner.devices().into_iter().next() {
//!     let dispatcher = controller.dispatcher();
//!     controller.connect(
//!         device,
//!         Some(Box::new(move |_session: &pmocast::ActiveSession| {
//!             let _ = dispatcher.load_queue(build_queue_entries(&tracks), 0);
//!         })),
//!     )?;
//! }
//! # Ok::<(), pmocast::CastError>(())
//! ```

mod events;

pub mod cast;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod media;
pub mod model;
pub mod online;
pub mod queue;
pub mod registry;
pub mod session;
pub mod track;

pub use cast::{
    ApplicationSession, CastChannel, CastConnector, ChannelSettings,
    DEFAULT_MEDIA_RECEIVER_APP_ID, MediaStatus, PlayerState, RustCastConnector,
};
pub use config::CastConfig;
pub use discovery::chromecast_discovery::MdnsSettings;
pub use discovery::{DeviceScanner, DiscoveryBackend, DiscoverySink, MdnsDiscoveryBackend};
pub use errors::CastError;
pub use events::EventBus;
pub use media::{
    Artwork, MediaDescriptor, MediaMetadata, QueueEntry, StreamType, build_media_descriptor,
    build_queue_entries,
};
pub use model::{
    DEFAULT_CAST_PORT, Device, DeviceId, DiscoveryEvent, DiscoveryFilter, LoadId,
    QueueLoadOutcome, ScanMode, SessionEvent,
};
pub use queue::{LoadRequest, QueueDispatcher, QueueLoadRequest};
pub use registry::DeviceRegistry;
pub use session::{ActiveSession, ConnectedCallback, SessionConfig, SessionController, SessionState};
pub use track::{JsonTrackProvider, TrackDescriptor, TrackProvider};

pub type Result<T> = std::result::Result<T, CastError>;
