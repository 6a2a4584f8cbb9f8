//! Wire models for the device API.
//!
//! The vendor's responses carry many more fields than the client needs;
//! serde drops unknown fields so only the ones the orchestration layers
//! consume are modeled here.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` means this was the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// A photo or video known to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Server-side id; absent for assets that only exist locally
    #[serde(default)]
    pub id: Option<String>,
    /// Client-generated identifier correlating pre- and post-upload state
    #[serde(default)]
    pub local_identifier: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Base64 MD5 of the stored object
    #[serde(default)]
    pub md5_hash: Option<String>,
    /// Capture timestamp as reported by the vendor
    #[serde(default)]
    pub taken_at: Option<String>,
    /// `[latitude, longitude]`
    #[serde(default)]
    pub location: Option<Vec<f64>>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Asset {
    /// Parsed capture timestamp, `None` when absent or unparseable.
    pub fn taken_at_dt(&self) -> Option<DateTime<Utc>> {
        self.taken_at.as_deref().and_then(parse_vendor_timestamp)
    }

    /// `(latitude, longitude)` when the asset carries a location.
    pub fn lat_lon(&self) -> Option<(f64, f64)> {
        match self.location.as_deref() {
            Some([lat, lon, ..]) => Some((*lat, *lon)),
            _ => None,
        }
    }

    /// Path-safe capture timestamp used to prefix exported filenames.
    pub fn path_safe_taken_at(&self) -> String {
        match self.taken_at_dt() {
            Some(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            None => "00000000T000000".to_string(),
        }
    }

    /// Identifier used when reporting this asset in batch outcomes.
    pub fn report_id(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.local_identifier.clone())
            .or_else(|| self.file_name.clone())
            .unwrap_or_else(|| "<unknown asset>".to_string())
    }
}

/// Reference to an asset in select/exclude/remove calls: either a
/// server-side id or, pre-upload, the client's local identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    Id(String),
    LocalIdentifier(String),
}

impl AssetRef {
    /// Request representation expected by the device API.
    pub fn to_request_value(&self) -> serde_json::Value {
        match self {
            AssetRef::Id(id) => serde_json::json!({ "asset_id": id }),
            AssetRef::LocalIdentifier(local) => {
                serde_json::json!({ "asset_local_identifier": local })
            }
        }
    }
}

/// Payload for the post-upload `batch_update` call that makes an uploaded
/// asset durable on the service side.
#[derive(Debug, Clone, Serialize)]
pub struct AssetUpdate {
    pub local_identifier: String,
    pub file_name: String,
    pub md5_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec<f64>>,
}

/// A physical display device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub playlists: Vec<Playlist>,
}

impl Frame {
    /// Name usable as a directory component.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("frame")
    }
}

/// An ordered album of assets on a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Text (currently always a caption) bound to one asset in one playlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(rename = "type", default)]
    pub attachment_type: Option<String>,
    /// The caption text
    #[serde(default)]
    pub data: Option<String>,
}

impl Attachment {
    pub fn is_caption(&self) -> bool {
        self.attachment_type.as_deref() == Some("caption")
    }
}

/// An event on a frame (photos added, comments, ...). Kept opaque beyond
/// the id; exports dump the raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The authenticated account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Parse the vendor's timestamp format. RFC3339 with or without
/// fractional seconds, with a naive-UTC fallback.
pub fn parse_vendor_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
