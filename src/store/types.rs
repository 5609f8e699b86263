//! Persistent record types for the emoji store.

use serde::{Deserialize, Serialize};

/// One emoji as stored and as returned by every query.
///
/// The record carries everything a picker UI needs to render the emoji;
/// the store itself only interprets `unicode` (primary key), `group` +
/// `order` (composite index) and `tokens` (search index). The rest is
/// opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiRecord {
    /// Unicode sequence of the emoji. Primary key.
    pub unicode: String,

    /// Sorted, deduplicated search tokens derived at load time from the
    /// annotation, tags, shortcodes and emoticon.
    pub tokens: Vec<String>,

    /// Shortcodes in dataset order. Token sources, but also kept verbatim
    /// so shortcode lookup can tell a real shortcode from a mere token hit.
    pub shortcodes: Vec<String>,

    /// Category id. `None` for entries outside any group; such records do
    /// not appear in group browsing.
    pub group: Option<u32>,

    /// Display rank. Unique within a group.
    pub order: u32,

    /// Human-readable name ("grinning face").
    pub annotation: String,

    /// Text emoticon (":-D") if the emoji has one.
    pub emoticon: Option<String>,

    /// Skin-tone variants. Carried through untouched.
    pub skin_tones: Vec<SkinVariant>,

    /// Unicode release the emoji first appeared in.
    pub version: Option<f32>,
}

/// A skin-tone variant of a base emoji.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinVariant {
    /// Fitzpatrick tone indexes. Two entries for two-person emoji.
    pub tones: Vec<u8>,

    /// Unicode sequence of the variant.
    pub unicode: String,
}
