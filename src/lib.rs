//! emojidb - embedded transactional emoji database
//!
//! A persistent, indexed store of emoji records kept in sync with a
//! versioned remote dataset through a `(url, eTag)` validation pair.
//! Callers fetch dataset bytes themselves; this crate owns everything
//! after that: transformation, atomic full-replace loads, indexing, and
//! the four read operations (group browsing, multi-token AND search with
//! trailing-prefix matching, shortcode lookup, unicode lookup).
//!
//! # Architecture
//!
//! - Commits write immutable snapshot files; `current.json` is swapped
//!   atomically to publish them. Readers pin one snapshot per transaction
//!   and never block writers.
//! - One writer at a time, across connections *and* processes, enforced
//!   by an advisory file lock. A write transaction re-reads the pointer
//!   under the lock, so its staleness checks are authoritative.
//! - A load with an already-stored `(url, eTag)` pair commits nothing:
//!   reloads are idempotent.
//!
//! # Usage
//!
//! ```no_run
//! use emojidb::Connection;
//!
//! # async fn sync(bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::open("/var/lib/myapp/emoji").await?;
//!
//! let url = "https://cdn.example.com/emoji/en.json";
//! let etag = "\"33a64df5\"";
//! if !emojidb::has_data(&conn, url, etag).await? {
//!     emojidb::load_data(&conn, bytes, url, etag).await?;
//! }
//!
//! for emoji in emojidb::get_emoji_by_search_query(&conn, "grinning fa").await? {
//!     println!("{} {}", emoji.unicode, emoji.annotation);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod loader;
pub mod query;
pub mod schema;
pub mod store;
pub mod tokens;

pub use connection::{Connection, Transaction, TransactionMode};
pub use error::{LoadError, OpenError, QueryError, TransactionError, TransformError};
pub use loader::{has_data, is_empty, load_data, transform_dataset};
pub use query::{
    get_emoji_by_group, get_emoji_by_search_query, get_emoji_by_shortcode, get_emoji_by_unicode,
};
pub use schema::StoreName;
pub use store::{EmojiRecord, SkinVariant};
