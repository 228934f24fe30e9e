//! Track records supplied by the feed collaborator.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CastError;

/// One playable entry of a feed.
///
/// Fields missing from the source are left empty (strings) or zero
/// (numbers); nothing here is validated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDescriptor {
    pub id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    /// Largest artwork available, see `image_height`.
    pub image_url: String,
    /// Height in pixels of the artwork at `image_url` (artwork is square).
    pub image_height: u32,
    /// Playable content locator.
    pub preview_url: String,
    pub duration_secs: f64,
    pub content_type: String,
}

/// Anything able to hand over an ordered list of tracks.
pub trait TrackProvider {
    fn tracks(&self) -> Result<Vec<TrackDescriptor>, CastError>;
}

/// Reads a JSON array of [`TrackDescriptor`]s.
#[derive(Clone, Debug)]
pub enum JsonTrackProvider {
    File(PathBuf),
    Inline(String),
}

impl JsonTrackProvider {
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        JsonTrackProvider::File(path.as_ref().to_path_buf())
    }

    pub fn from_json(json: impl Into<String>) -> Self {
        JsonTrackProvider::Inline(json.into())
    }
}

impl TrackProvider for JsonTrackProvider {
    fn tracks(&self) -> Result<Vec<TrackDescriptor>, CastError> {
        let tracks: Vec<TrackDescriptor> = match self {
            JsonTrackProvider::File(path) => {
                let data = fs::read(path)?;
                serde_json::from_slice(&data)?
            }
            JsonTrackProvider::Inline(json) => serde_json::from_str(json)?,
        };
        debug!(count = tracks.len(), "Loaded track records");
        Ok(tracks)
    }
}

impl TrackProvider for Vec<TrackDescriptor> {
    fn tracks(&self) -> Result<Vec<TrackDescriptor>, CastError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let provider = JsonTrackProvider::from_json(
            r#"[{"id": "1", "track_name": "Intro"}, {"preview_url": "http://x/2.m4a", "duration_secs": 30.5}]"#,
        );
        let tracks = provider.tracks().unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_name, "Intro");
        assert_eq!(tracks[0].image_url, "");
        assert_eq!(tracks[0].image_height, 0);
        assert_eq!(tracks[1].id, "");
        assert_eq!(tracks[1].duration_secs, 30.5);
    }

    #[test]
    fn test_order_is_preserved_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.json");
        let tracks: Vec<TrackDescriptor> = ["a", "b", "c"]
            .iter()
            .map(|id| TrackDescriptor {
                id: id.to_string(),
                ..Default::default()
            })
            .collect();
        fs::write(&path, serde_json::to_vec(&tracks).unwrap()).unwrap();

        let loaded = JsonTrackProvider::from_file(&path).tracks().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = JsonTrackProvider::from_json("{not json").tracks().unwrap_err();
        assert!(matches!(err, CastError::Json(_)));
    }
}
