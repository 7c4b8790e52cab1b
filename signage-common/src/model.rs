//! Signage data model
//!
//! Media items, display settings and the small helpers shared by the
//! repositories and schedulers: URL validation, locally synthesized ids and
//! playlist ordering.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of ids synthesized while operating against the local backend.
///
/// Such ids never exist on the remote backend.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Display time for image/gif items that carry no duration
pub const DEFAULT_IMAGE_DURATION_S: u32 = 10;

/// Marquee text of the factory settings record
pub const DEFAULT_MARQUEE_TEXT: &str = "PRESENTED BY BE UNIQUE EXHIBITS";

/// Media item type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Gif,
}

impl MediaKind {
    /// Timed items advance on a duration timer; the others advance when the
    /// media element reports its natural end.
    pub fn is_timed(self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::Gif)
    }

    /// Only still/animated images are fetched ahead of time
    pub fn is_preloadable(self) -> bool {
        self.is_timed()
    }

    /// Video always starts muted so autoplay is permitted
    pub fn starts_muted(self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Gif => write!(f, "gif"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "gif" => Ok(MediaKind::Gif),
            other => Err(Error::InvalidInput(format!("Unknown media type: {}", other))),
        }
    }
}

/// One entry of the visual playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Store-assigned (remote) or `local_<millis>` (local); never changes
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Seconds; only meaningful for image/gif
    #[serde(default)]
    pub duration: u32,
    /// Playback position key, ascending
    pub order: i64,
    /// Backend-specific creation timestamp
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl MediaItem {
    /// True when the id was synthesized locally
    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    /// How long a timed item stays on screen; a zero duration means `default`
    pub fn display_duration(&self, default: Duration) -> Duration {
        if self.duration == 0 {
            default
        } else {
            Duration::from_secs(u64::from(self.duration))
        }
    }

    /// Build an item from a store document and its id
    pub fn from_document(id: &str, data: &Map<String, Value>) -> Result<Self> {
        let mut doc = data.clone();
        doc.insert("id".to_string(), Value::String(id.to_string()));
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    /// Store document for this item (the id is the document key, not a field)
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("url".to_string(), Value::String(self.url.clone()));
        doc.insert("type".to_string(), Value::String(self.kind.to_string()));
        doc.insert("duration".to_string(), Value::from(self.duration));
        doc.insert("order".to_string(), Value::from(self.order));
        if let Some(created_at) = &self.created_at {
            doc.insert("createdAt".to_string(), Value::String(created_at.clone()));
        }
        doc
    }
}

/// True when `id` was synthesized locally
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Synthesize a local id from a timestamp
pub fn local_id(now: DateTime<Utc>) -> String {
    format!("{}{}", LOCAL_ID_PREFIX, now.timestamp_millis())
}

/// Check the add-media URL constraint
///
/// Accepts anything containing a scheme separator (`://`) or starting with a
/// path separator. Empty input is rejected.
pub fn validate_media_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::InvalidInput("Media URL is empty".to_string()));
    }
    if !url.contains("://") && !url.starts_with('/') {
        return Err(Error::InvalidInput(format!("Invalid URL format: {}", url)));
    }
    Ok(())
}

/// Sort a playlist ascending by `order`, ties broken by id
pub fn sort_playlist(items: &mut [MediaItem]) {
    items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

/// `order` for an appended item
///
/// Equals the playlist length while orders are dense; after deletions it
/// stays above every existing key so no two items share an order.
pub fn next_order(items: &[MediaItem]) -> i64 {
    let len = items.len() as i64;
    match items.iter().map(|m| m.order).max() {
        Some(max) => len.max(max + 1),
        None => 0,
    }
}

/// Display configuration singleton
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub marquee_text: String,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url3: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            marquee_text: DEFAULT_MARQUEE_TEXT.to_string(),
            logo_url: String::new(),
            audio_url: String::new(),
            audio_url2: Some(String::new()),
            audio_url3: Some(String::new()),
        }
    }
}

impl AppSettings {
    /// Non-empty audio URLs in field order
    pub fn effective_audio_playlist(&self) -> Vec<String> {
        [
            Some(&self.audio_url),
            self.audio_url2.as_ref(),
            self.audio_url3.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|url| !url.is_empty())
        .cloned()
        .collect()
    }

    /// Union merge: fields present in `patch` win, the rest are kept
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = &patch.marquee_text {
            self.marquee_text = v.clone();
        }
        if let Some(v) = &patch.logo_url {
            self.logo_url = v.clone();
        }
        if let Some(v) = &patch.audio_url {
            self.audio_url = v.clone();
        }
        if let Some(v) = &patch.audio_url2 {
            self.audio_url2 = Some(v.clone());
        }
        if let Some(v) = &patch.audio_url3 {
            self.audio_url3 = Some(v.clone());
        }
    }

    /// Copy of `self` with `patch` merged in
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut out = self.clone();
        out.apply(patch);
        out
    }
}

/// Partial settings update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marquee_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url3: Option<String>,
}

impl SettingsPatch {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.marquee_text.is_none()
            && self.logo_url.is_none()
            && self.audio_url.is_none()
            && self.audio_url2.is_none()
            && self.audio_url3.is_none()
    }

    /// Parse a store document, ignoring unknown fields
    pub fn from_document(data: &Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(data.clone()))?)
    }

    /// Store document holding only the present fields
    pub fn to_document(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Internal("settings patch is not an object".to_string())),
        }
    }
}

impl From<AppSettings> for SettingsPatch {
    fn from(s: AppSettings) -> Self {
        Self {
            marquee_text: Some(s.marquee_text),
            logo_url: Some(s.logo_url),
            audio_url: Some(s.audio_url),
            audio_url2: Some(s.audio_url2.unwrap_or_default()),
            audio_url3: Some(s.audio_url3.unwrap_or_default()),
        }
    }
}

/// Which store implementation is serving reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// Viewing mode of the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Unattended rotation is running
    Public,
    /// Operator is editing; schedulers are torn down
    Admin,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, order: i64) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            url: format!("https://cdn.example/{}.png", id),
            kind: MediaKind::Image,
            duration: 5,
            order,
            created_at: None,
        }
    }

    #[test]
    fn test_validate_media_url() {
        assert!(validate_media_url("https://example.com/a.png").is_ok());
        assert!(validate_media_url("/static/loop.mp4").is_ok());
        assert!(validate_media_url("").is_err());
        assert!(validate_media_url("example.com/a.png").is_err());
        assert!(validate_media_url("relative/path.gif").is_err());
    }

    #[test]
    fn test_media_kind_parsing() {
        assert_eq!("image".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert_eq!("GIF".parse::<MediaKind>().unwrap(), MediaKind::Gif);
        assert!("slideshow".parse::<MediaKind>().is_err());
        assert!(MediaKind::Gif.is_timed());
        assert!(!MediaKind::Video.is_timed());
        assert!(MediaKind::Video.starts_muted());
        assert!(!MediaKind::Audio.starts_muted());
    }

    #[test]
    fn test_display_duration_falls_back_to_default() {
        let default = Duration::from_secs(u64::from(DEFAULT_IMAGE_DURATION_S));
        let mut m = item("a", 0);
        m.duration = 0;
        assert_eq!(m.display_duration(default), Duration::from_secs(10));
        m.duration = 3;
        assert_eq!(m.display_duration(default), Duration::from_secs(3));
    }

    #[test]
    fn test_local_ids() {
        let now = Utc::now();
        let id = local_id(now);
        assert!(is_local_id(&id));
        assert_eq!(id, format!("local_{}", now.timestamp_millis()));
        assert!(!is_local_id("Xk29fa0"));
    }

    #[test]
    fn test_sort_and_next_order() {
        let mut items = vec![item("c", 2), item("a", 0), item("b", 1)];
        sort_playlist(&mut items);
        let ids: Vec<_> = items.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(next_order(&items), 3);

        // After deleting the first item the length would collide with "c"
        items.remove(0);
        assert_eq!(next_order(&items), 3);
        assert_eq!(next_order(&[]), 0);
    }

    #[test]
    fn test_document_conversion() {
        let mut m = item("doc1", 4);
        m.created_at = Some("2026-01-06T09:00:00Z".to_string());
        let doc = m.to_document();
        assert!(!doc.contains_key("id"));
        assert_eq!(doc["type"], "image");
        let back = MediaItem::from_document("doc1", &doc).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_effective_audio_playlist_skips_empty() {
        let settings = AppSettings {
            audio_url: "https://a.example/1.mp3".to_string(),
            audio_url2: Some(String::new()),
            audio_url3: Some("https://a.example/3.mp3".to_string()),
            ..AppSettings::default()
        };
        assert_eq!(
            settings.effective_audio_playlist(),
            vec!["https://a.example/1.mp3", "https://a.example/3.mp3"]
        );
        assert!(AppSettings::default().effective_audio_playlist().is_empty());
    }

    #[test]
    fn test_patch_merge_keeps_unrelated_fields() {
        let base = AppSettings {
            logo_url: "https://a.example/logo.png".to_string(),
            ..AppSettings::default()
        };
        let patch = SettingsPatch {
            marquee_text: Some("X".to_string()),
            ..SettingsPatch::default()
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.marquee_text, "X");
        assert_eq!(merged.logo_url, "https://a.example/logo.png");

        let doc = patch.to_document().unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["marqueeText"], "X");
    }

    #[test]
    fn test_settings_serde_field_names() {
        let json = serde_json::to_value(AppSettings::default()).unwrap();
        assert!(json.get("marqueeText").is_some());
        assert!(json.get("audioUrl2").is_some());

        let patch: SettingsPatch =
            serde_json::from_value(serde_json::json!({"audioUrl3": "https://x/y.mp3", "other": 1}))
                .unwrap();
        assert_eq!(patch.audio_url3.as_deref(), Some("https://x/y.mp3"));
        assert!(patch.marquee_text.is_none());
    }
}
