//! Conversions between the crate's media model and rust_cast's.
//!
//! rust_cast writes whatever it is given; receivers drop the connection on a
//! message over 64 KiB, so loads are sized here before they leave.

use rust_cast::channels::media::{
    Image, Media, MediaQueue, Metadata, MusicTrackMediaMetadata, QueueItem, QueueType, StatusEntry,
    StreamType as WireStreamType,
};
use serde_json::{Value, json};
use tracing::debug;

use crate::cast::{MediaStatus, PlayerState};
use crate::errors::CastError;
use crate::media::{
    MediaDescriptor, QUEUE_AUTOPLAY, QUEUE_PRELOAD_TIME_SECS, QUEUE_START_TIME_SECS, QueueEntry,
    StreamType,
};
use crate::queue::{LoadRequest, QueueLoadRequest};

/// Largest message a receiver accepts, envelope included.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protobuf envelope around the JSON payload: namespace, source and
/// destination ids, field tags.
const ENVELOPE_OVERHEAD: usize = 128;

impl From<rust_cast::channels::media::PlayerState> for PlayerState {
    fn from(state: rust_cast::channels::media::PlayerState) -> Self {
        use rust_cast::channels::media::PlayerState as Wire;

        match state {
            Wire::Idle => PlayerState::Idle,
            Wire::Playing => PlayerState::Playing,
            Wire::Buffering => PlayerState::Buffering,
            Wire::Paused => PlayerState::Paused,
        }
    }
}

impl From<&StatusEntry> for MediaStatus {
    fn from(entry: &StatusEntry) -> Self {
        MediaStatus {
            media_session_id: Some(i64::from(entry.media_session_id)),
            player_state: entry.player_state.into(),
        }
    }
}

fn stream_type(stream_type: StreamType) -> WireStreamType {
    match stream_type {
        StreamType::Buffered => WireStreamType::Buffered,
        StreamType::Live => WireStreamType::Live,
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn media(descriptor: &MediaDescriptor) -> Media {
    let images = descriptor
        .metadata
        .artwork
        .iter()
        .map(|artwork| Image {
            url: artwork.url.to_string(),
            dimensions: Some((artwork.width, artwork.height)),
        })
        .collect();

    Media {
        content_id: descriptor.content_id.clone(),
        stream_type: stream_type(descriptor.stream_type),
        content_type: descriptor.content_type.clone(),
        metadata: Some(Metadata::MusicTrack(MusicTrackMediaMetadata {
            title: non_empty(&descriptor.metadata.title),
            artist: non_empty(&descriptor.metadata.artist),
            album_name: non_empty(&descriptor.metadata.album_name),
            images,
            ..Default::default()
        })),
        duration: Some(descriptor.duration_secs as f32),
    }
}

fn has_default_hints(entry: &QueueEntry) -> bool {
    entry.autoplay == QUEUE_AUTOPLAY
        && entry.start_time_secs == QUEUE_START_TIME_SECS
        && entry.preload_time_secs == QUEUE_PRELOAD_TIME_SECS
}

pub fn media_queue(request: &QueueLoadRequest) -> Result<MediaQueue, CastError> {
    let start_index = u16::try_from(request.start_index).map_err(|_| CastError::RequestTooLarge {
        size: request.items.len(),
        limit: usize::from(u16::MAX),
    })?;

    if !request.items.iter().all(has_default_hints) {
        debug!("Per-item queue hints differ from the defaults and are not transmitted");
    }

    Ok(MediaQueue {
        items: request
            .items
            .iter()
            .map(|entry| QueueItem {
                media: media(&entry.media),
            })
            .collect(),
        start_index,
        queue_type: QueueType::Playlist,
    })
}

/// JSON shape of a media item as the receiver gets it.
fn media_payload(descriptor: &MediaDescriptor) -> Value {
    let metadata = &descriptor.metadata;
    let mut music = json!({
        "metadataType": 3,
        "images": metadata.artwork.iter().map(|artwork| json!({
            "url": artwork.url.as_str(),
            "width": artwork.width,
            "height": artwork.height,
        })).collect::<Vec<_>>(),
    });
    for (key, value) in [
        ("title", &metadata.title),
        ("albumName", &metadata.album_name),
        ("artist", &metadata.artist),
    ] {
        if !value.is_empty() {
            music[key] = json!(value);
        }
    }

    json!({
        "contentId": descriptor.content_id,
        "streamType": stream_type(descriptor.stream_type).to_string(),
        "contentType": descriptor.content_type,
        "metadata": music,
        "duration": descriptor.duration_secs as f32,
    })
}

fn payload(request: &LoadRequest) -> Value {
    // Largest request id, so the estimate never falls short.
    let request_id = u32::MAX;

    match request {
        LoadRequest::Queue(queue) => json!({
            "type": "QUEUE_LOAD",
            "requestId": request_id,
            "items": queue.items.iter().map(|entry| json!({
                "autoplay": QUEUE_AUTOPLAY,
                "media": media_payload(&entry.media),
                "playbackDuration": null,
                "preloadTime": QUEUE_PRELOAD_TIME_SECS,
                "startTime": QUEUE_START_TIME_SECS,
            })).collect::<Vec<_>>(),
            "queueType": QueueType::Playlist.to_string(),
            "repeatMode": "REPEAT_OFF",
            "startIndex": queue.start_index,
        }),
        LoadRequest::Media(media) => json!({
            "requestId": request_id,
            "sessionId": "",
            "type": "LOAD",
            "media": media_payload(media),
            "currentTime": 0.0,
            "customData": {},
            "autoplay": true,
        }),
    }
}

/// Bytes `request` takes on the wire, envelope included.
pub fn request_size(request: &LoadRequest) -> usize {
    payload(request).to_string().len() + ENVELOPE_OVERHEAD
}

/// Refuses a load the receiver would answer by closing the connection.
pub fn check_request_size(request: &LoadRequest) -> Result<(), CastError> {
    let size = request_size(request);
    if size > MAX_MESSAGE_SIZE {
        return Err(CastError::RequestTooLarge {
            size,
            limit: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}
