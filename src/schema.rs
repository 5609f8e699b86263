//! Store names and on-disk layout constants.
//!
//! A database directory holds exactly two named stores plus the files that
//! persist them:
//!
//! ```text
//! <dir>/
//! ├── current.json      # pointer to the committed snapshot (atomic swap)
//! ├── snap_000001.bin   # versioned snapshot: magic + format + payload
//! └── .lock             # flock target for the cross-process writer lock
//! ```

/// The named stores inside one database. A transaction declares up front
/// which of them it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreName {
    /// Emoji records, keyed by unicode sequence.
    Emoji,
    /// String key-value metadata (dataset provenance).
    Meta,
}

impl StoreName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::Emoji => "emoji",
            StoreName::Meta => "meta",
        }
    }
}

/// Reserved meta key: entity tag of the dataset the store currently holds.
pub const KEY_ETAG: &str = "eTag";

/// Reserved meta key: URL the dataset was fetched from.
pub const KEY_URL: &str = "url";

/// Pointer file name. Replaced atomically (tmp + rename) on every commit.
pub const CURRENT_FILE: &str = "current.json";

/// flock target. Exists only to be locked; contents are never read.
pub const LOCK_FILE: &str = ".lock";

/// Snapshot file name prefix. Full name is `snap_<version:06>.bin`.
pub const SNAPSHOT_PREFIX: &str = "snap_";

pub const SNAPSHOT_EXT: &str = "bin";

/// First four bytes of every snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"EMDB";

/// Snapshot payload encoding version. Bumped when the binary layout of
/// [`crate::store::types::EmojiRecord`] changes.
pub const FORMAT_VERSION: u16 = 1;

/// Store layout version recorded in the pointer file. Opening a directory
/// written by a newer layout fails instead of guessing.
pub const SCHEMA_VERSION: u16 = 1;
