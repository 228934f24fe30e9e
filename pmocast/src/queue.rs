//! Loading media onto the receiver's playback queue.
//!
//! The dispatcher only validates and forwards: the session actor owns the
//! in-flight load and reports every accepted [`LoadId`] back as a
//! [`SessionEvent::QueueLoadResult`](crate::model::SessionEvent).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::errors::CastError;
use crate::media::{MediaDescriptor, QueueEntry};
use crate::model::LoadId;
use crate::session::actor::Command;
use crate::session::state::StateCell;

/// Replaces the receiver's whole queue.
///
/// Always sent as a playlist with repeat off, playback starting at the
/// beginning of `items[start_index]`.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueLoadRequest {
    pub items: Vec<QueueEntry>,
    pub start_index: usize,
}

impl QueueLoadRequest {
    pub fn new(items: Vec<QueueEntry>, start_index: usize) -> Self {
        Self { items, start_index }
    }

    pub fn validate(&self) -> Result<(), CastError> {
        if self.items.is_empty() {
            return Err(CastError::EmptyQueue);
        }
        if self.start_index >= self.items.len() {
            return Err(CastError::StartIndexOutOfRange {
                index: self.start_index,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadRequest {
    Queue(QueueLoadRequest),
    Media(MediaDescriptor),
}

impl LoadRequest {
    pub fn item_count(&self) -> usize {
        match self {
            LoadRequest::Queue(queue) => queue.items.len(),
            LoadRequest::Media(_) => 1,
        }
    }
}

/// Handle used to push media to the active session.
///
/// Cheap to clone; every clone talks to the same controller.
#[derive(Clone)]
pub struct QueueDispatcher {
    commands: Sender<Command>,
    state: StateCell,
    next_load_id: Arc<AtomicU64>,
}

impl QueueDispatcher {
    pub(crate) fn new(commands: Sender<Command>, state: StateCell) -> Self {
        Self {
            commands,
            state,
            next_load_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Replaces the receiver's queue with `items`, playing `items[start_index]` first.
    pub fn load_queue(&self, items: Vec<QueueEntry>, start_index: usize) -> Result<LoadId, CastError> {
        self.ensure_active()?;
        let request = QueueLoadRequest::new(items, start_index);
        request.validate()?;
        self.submit(LoadRequest::Queue(request))
    }

    /// Loads a single item, dropping the receiver's current queue.
    pub fn load_media(&self, media: MediaDescriptor) -> Result<LoadId, CastError> {
        self.ensure_active()?;
        self.submit(LoadRequest::Media(media))
    }

    fn ensure_active(&self) -> Result<(), CastError> {
        if self.state.get().is_active() {
            Ok(())
        } else {
            warn!(state = ?self.state.get(), "Cast receiver not connected on playback attempt");
            Err(CastError::NoActiveSession)
        }
    }

    fn submit(&self, request: LoadRequest) -> Result<LoadId, CastError> {
        let load_id = LoadId(self.next_load_id.fetch_add(1, Ordering::Relaxed));
        debug!(%load_id, items = request.item_count(), "Submitting load");
        self.commands
            .send(Command::Load { load_id, request })
            .map_err(|_| CastError::ControllerStopped)?;
        Ok(load_id)
    }
}
