//! Control channel to a Cast receiver.
//!
//! The session controller only sees the [`CastConnector`] and
//! [`CastChannel`] traits; [`RustCastConnector`] is the rust_cast backed
//! implementation used against real receivers.

mod chromecast_channel;
pub mod wire;

use std::sync::Arc;

pub use chromecast_channel::{ChannelSettings, RustCastChannel, RustCastConnector};
pub use wire::{MAX_MESSAGE_SIZE, check_request_size};

use crate::errors::CastError;
use crate::model::Device;
use crate::queue::LoadRequest;

/// Google's Default Media Receiver.
pub const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";

/// A running receiver application the sender has joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationSession {
    pub app_id: String,
    pub session_id: String,
    /// Destination id of the application's endpoint.
    pub transport_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    Buffering,
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Buffering)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaStatus {
    pub media_session_id: Option<i64>,
    pub player_state: PlayerState,
}

/// Opens control channels.
pub trait CastConnector: Send + Sync {
    fn connect(&self, device: &Device) -> Result<Arc<dyn CastChannel>, CastError>;
}

/// An open control channel.
///
/// Every call blocks until the receiver answers or the channel's request
/// timeout expires. Calls are serialized by the implementation.
pub trait CastChannel: Send + Sync {
    fn launch_application(&self, app_id: &str) -> Result<ApplicationSession, CastError>;

    fn load(
        &self,
        session: &ApplicationSession,
        request: &LoadRequest,
    ) -> Result<MediaStatus, CastError>;

    fn media_status(&self, session: &ApplicationSession) -> Result<Option<MediaStatus>, CastError>;

    fn play(&self, session: &ApplicationSession, media_session_id: i64) -> Result<MediaStatus, CastError>;

    fn pause(&self, session: &ApplicationSession, media_session_id: i64) -> Result<MediaStatus, CastError>;

    fn stop_application(&self, session: &ApplicationSession) -> Result<(), CastError>;

    /// Idempotent.
    fn close(&self);
}
