//! Track → media descriptor → queue entry conversion.

use tracing::debug;
use url::Url;

use crate::track::TrackDescriptor;

/// Playback hints applied to every queue entry.
pub const QUEUE_START_TIME_SECS: f64 = 0.0;
pub const QUEUE_AUTOPLAY: bool = true;
pub const QUEUE_PRELOAD_TIME_SECS: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StreamType {
    #[default]
    Buffered,
    Live,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artwork {
    pub url: Url,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub album_name: String,
    pub artwork: Option<Artwork>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaDescriptor {
    pub content_id: String,
    pub stream_type: StreamType,
    pub content_type: String,
    pub metadata: MediaMetadata,
    pub duration_secs: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueEntry {
    pub media: MediaDescriptor,
    pub start_time_secs: f64,
    pub autoplay: bool,
    pub preload_time_secs: f64,
}

impl QueueEntry {
    pub fn new(media: MediaDescriptor) -> Self {
        Self {
            media,
            start_time_secs: QUEUE_START_TIME_SECS,
            autoplay: QUEUE_AUTOPLAY,
            preload_time_secs: QUEUE_PRELOAD_TIME_SECS,
        }
    }
}

fn build_artwork(track: &TrackDescriptor) -> Option<Artwork> {
    match Url::parse(&track.image_url) {
        Ok(url) => Some(Artwork {
            url,
            width: track.image_height,
            height: track.image_height,
        }),
        Err(e) => {
            debug!(track = %track.id, image_url = %track.image_url, "Artwork omitted: {}", e);
            None
        }
    }
}

pub fn build_media_descriptor(track: &TrackDescriptor) -> MediaDescriptor {
    MediaDescriptor {
        content_id: track.preview_url.clone(),
        stream_type: StreamType::Buffered,
        content_type: track.content_type.clone(),
        metadata: MediaMetadata {
            title: track.track_name.clone(),
            artist: track.artist_name.clone(),
            album_name: track.album_name.clone(),
            artwork: build_artwork(track),
        },
        duration_secs: track.duration_secs,
    }
}

pub fn build_queue_entries(tracks: &[TrackDescriptor]) -> Vec<QueueEntry> {
    tracks
        .iter()
        .map(|track| QueueEntry::new(build_media_descriptor(track)))
        .collect()
}
