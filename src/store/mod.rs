//! Persistent store internals.
//!
//! - [`types`]: record types shared with the public API
//! - [`state`]: immutable indexed state + the transaction draft
//! - [`manifest`]: snapshot files and the atomic CURRENT pointer
//! - [`lock`]: cross-process writer lock

pub mod lock;
pub mod manifest;
pub mod state;
pub mod types;

pub use types::{EmojiRecord, SkinVariant};
