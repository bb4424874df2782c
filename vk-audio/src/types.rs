//! Data types scraped from VK audio pages and `al_audio.php` payloads.
//!
//! VK sends audio as positional arrays rather than objects, so these types
//! are filled by hand in [`scrape`](crate::scrape) instead of being derived
//! from the wire format. The serde derives describe the crate's own output
//! (e.g. the CLI's `--json` mode).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A reference to one audio, as accepted by `act=reload_audios`.
///
/// Rendered as `owner_id`, `audio_id` and every hash joined with `_`,
/// e.g. `2000123_456789_8a1c0f_e3b7d2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioRef {
    pub owner_id: String,
    pub audio_id: String,
    pub hashes: Vec<String>,
}

impl AudioRef {
    /// Build a reference, returning `None` if any part is empty.
    pub fn new(owner_id: String, audio_id: String, hashes: Vec<String>) -> Option<Self> {
        if owner_id.is_empty() || audio_id.is_empty() || hashes.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            owner_id,
            audio_id,
            hashes,
        })
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.owner_id, self.audio_id)?;
        for hash in &self.hashes {
            write!(f, "_{hash}")?;
        }
        Ok(())
    }
}

/// A resolved audio track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Audio ID, unique per owner.
    pub id: i64,
    /// Owner ID (negative for communities).
    pub owner_id: i64,
    /// Cover image URLs, smallest first. Empty when the track has no art.
    pub track_covers: Vec<String>,
    /// Playback URL. Decoded, and rewritten from HLS to MP3 when the client
    /// is configured to do so.
    pub url: String,
    pub artist: String,
    pub title: String,
    /// Duration in seconds.
    pub duration: u64,
}

/// An audio playlist ("album" in VK's mobile UI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub owner_id: i64,
    /// Mobile page of the playlist.
    pub url: String,
    /// Required to read somebody else's private-link playlist.
    pub access_hash: Option<String>,
    pub title: String,
    pub artist: String,
    /// Listen count, when the stats line could be parsed.
    pub plays: Option<u64>,
    /// Number of tracks. Only catalog payloads carry it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl Album {
    /// Mobile URL of the playlist `owner_id`_`id`.
    pub fn page_url(owner_id: i64, id: i64) -> String {
        format!("https://m.vk.com/audio?act=audio_playlist{owner_id}_{id}")
    }
}

/// One playlist block of a catalog section payload (`payload[1][1].playlists`).
///
/// Catalog sections are paged: when `has_more` is set, the next chunk is
/// requested with `act=load_catalog_section`, `section_id = id` and
/// `start_from = next_offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPlaylist {
    pub id: String,
    pub title: String,
    /// Raw positional audio arrays.
    pub list: Vec<Value>,
    pub has_more: bool,
    pub next_offset: Option<String>,
}

impl CatalogPlaylist {
    pub(crate) fn from_value(v: &Value) -> Self {
        Self {
            id: value_to_string(&v["id"]),
            title: v["title"].as_str().unwrap_or("").to_owned(),
            list: v["list"].as_array().cloned().unwrap_or_default(),
            has_more: truthy(&v["hasMore"]),
            next_offset: Some(value_to_string(&v["nextOffset"])).filter(|s| !s.is_empty()),
        }
    }
}

/// Render a JSON scalar the way VK expects it back in a form field.
///
/// Strings are returned as-is, numbers in decimal, `null` as empty.
pub(crate) fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => u8::from(*b).to_string(),
        _ => String::new(),
    }
}

/// VK mixes `true`, `1` and `"1"` for flags.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

/// Read an integer that may be encoded as a number or a numeric string.
pub(crate) fn value_to_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}
