//! Domain model structs persisted as JSON in the local data area.
//!
//! Field names follow the on-disk format (`message`, `type`, `file`,
//! `fileSize`, `createdAt`) so files written by earlier clients keep
//! loading.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crewchat_shared::{ChatId, Sender};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Unique, immutable chat identifier.
    pub id: ChatId,
    /// Display name.
    pub label: String,
    /// When the chat was created, stored as ISO-8601 with second precision.
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Build a chat stamped with the current instant.
    ///
    /// Sub-second precision is dropped so the persisted ISO-8601 text reads
    /// back to an equal value.
    pub fn new(id: ChatId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            created_at: Utc::now().trunc_subsecs(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Kind of a message. Images are written as `"file"` on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "file")]
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Thumbnail {
    pub path: String,
}

/// An image attachment referenced by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Attachment {
    /// Relative (`Images/<file>`) or absolute reference to the image.
    pub path: String,
    /// Size of the stored image in bytes.
    #[serde(rename = "fileSize")]
    pub byte_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
}

impl Attachment {
    pub fn new(path: impl Into<String>, byte_size: u64) -> Self {
        Self {
            path: path.into(),
            byte_size,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, path: impl Into<String>) -> Self {
        self.thumbnail = Some(Thumbnail { path: path.into() });
        self
    }

    pub fn thumbnail_path(&self) -> Option<&str> {
        self.thumbnail.as_ref().map(|t| t.path.as_str())
    }
}

/// A single chat entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Message {
    pub id: String,
    /// Full text for text messages, caption (possibly empty) for images.
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Present iff `kind` is [`MessageKind::Image`].
    #[serde(rename = "file", default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub sender: Sender,
    /// Milliseconds since the Unix epoch; the only ordering key.
    #[serde(deserialize_with = "millis::deserialize")]
    pub timestamp: i64,
}

impl Message {
    /// A text message with a fresh id.
    pub fn text(body: impl Into<String>, sender: Sender, timestamp: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: body.into(),
            kind: MessageKind::Text,
            attachment: None,
            sender,
            timestamp,
        }
    }

    /// An image message with a fresh id; the caption may be empty.
    pub fn image(
        caption: impl Into<String>,
        attachment: Attachment,
        sender: Sender,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: caption.into(),
            kind: MessageKind::Image,
            attachment: Some(attachment),
            sender,
            timestamp,
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == MessageKind::Image
    }
}

/// Stable sort by timestamp, ascending. Equal timestamps keep their
/// insertion order.
pub fn sort_by_timestamp(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

// Older files store milliseconds as doubles; accept both and truncate.
mod millis {
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let n = serde_json::Number::deserialize(d)?;
        if let Some(i) = n.as_i64() {
            return Ok(i);
        }
        n.as_f64()
            .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f.trunc() as i64)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {n}")))
    }
}
