//! Dataset transformation and bulk loading.
//!
//! A load is always a full replace: transform the raw dataset outside any
//! transaction, then delete-and-reinsert everything plus the provenance
//! meta keys in one atomic write transaction. The store never holds a mix
//! of two dataset versions.
//!
//! Staleness is decided by the `(url, eTag)` pair. [`has_data`] is the
//! cheap non-authoritative pre-check callers use to skip a download;
//! [`load_data`] repeats the comparison *inside* its write transaction,
//! because between the pre-check and the write another connection may have
//! completed an equivalent load. Collapsing the two checks into one would
//! reintroduce exactly that lost-update race.

use serde::Deserialize;

use crate::connection::{Connection, TransactionMode};
use crate::error::{LoadError, TransactionError, TransformError};
use crate::schema::{StoreName, KEY_ETAG, KEY_URL};
use crate::store::types::{EmojiRecord, SkinVariant};
use crate::tokens::{extract_tokens, normalize};

// ── Raw dataset shape ───────────────────────────────────────────────────────

/// One entry of the raw dataset, shaped like the emojibase distribution.
/// Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct RawEmoji {
    /// Unicode sequence. Required and non-empty.
    pub emoji: String,
    #[serde(default)]
    pub annotation: String,
    #[serde(default)]
    pub group: Option<u32>,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub shortcodes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub emoticon: Option<RawEmoticon>,
    #[serde(default)]
    pub skins: Vec<RawSkin>,
    #[serde(default)]
    pub version: Option<f32>,
}

/// The dataset ships either one emoticon or a list of spellings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawEmoticon {
    One(String),
    Many(Vec<String>),
}

impl RawEmoticon {
    /// First spelling; the rest are display alternates.
    fn primary(&self) -> Option<&str> {
        match self {
            RawEmoticon::One(s) => Some(s),
            RawEmoticon::Many(list) => list.first().map(String::as_str),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSkin {
    pub emoji: String,
    #[serde(default)]
    pub tone: Option<RawTone>,
}

/// A single Fitzpatrick index, or two for two-person emoji.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTone {
    One(u8),
    Many(Vec<u8>),
}

impl RawTone {
    fn to_vec(&self) -> Vec<u8> {
        match self {
            RawTone::One(tone) => vec![*tone],
            RawTone::Many(tones) => tones.clone(),
        }
    }
}

// ── Transform ───────────────────────────────────────────────────────────────

/// Parse and normalize raw dataset bytes into emoji records. Pure; touches
/// no store.
pub fn transform_dataset(bytes: &[u8]) -> Result<Vec<EmojiRecord>, TransformError> {
    let raw: Vec<RawEmoji> = serde_json::from_slice(bytes)?;
    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| transform_record(index, entry))
        .collect()
}

fn transform_record(index: usize, raw: RawEmoji) -> Result<EmojiRecord, TransformError> {
    if raw.emoji.is_empty() {
        return Err(TransformError::BadRecord {
            index,
            reason: "empty unicode sequence".into(),
        });
    }
    let order = match (raw.group, raw.order) {
        (Some(_), None) => {
            return Err(TransformError::BadRecord {
                index,
                reason: "grouped record without an order".into(),
            })
        }
        (_, Some(order)) => order,
        (None, None) => 0,
    };

    // Search tokens: annotation and tag words, each shortcode both whole
    // (shortcode lookup hits the token index with the entire string) and
    // word-split, plus the emoticon verbatim.
    let mut tokens: Vec<String> = extract_tokens(&raw.annotation);
    for tag in &raw.tags {
        tokens.extend(extract_tokens(tag));
    }
    for shortcode in &raw.shortcodes {
        tokens.push(normalize(shortcode));
        tokens.extend(extract_tokens(shortcode));
    }
    let emoticon = raw.emoticon.as_ref().and_then(RawEmoticon::primary);
    if let Some(emoticon) = emoticon {
        tokens.push(normalize(emoticon));
    }
    tokens.sort();
    tokens.dedup();

    Ok(EmojiRecord {
        unicode: raw.emoji,
        tokens,
        shortcodes: raw.shortcodes,
        group: raw.group,
        order,
        annotation: raw.annotation,
        emoticon: emoticon.map(str::to_string),
        skin_tones: raw
            .skins
            .into_iter()
            .map(|skin| SkinVariant {
                tones: skin.tone.as_ref().map(RawTone::to_vec).unwrap_or_default(),
                unicode: skin.emoji,
            })
            .collect(),
        version: raw.version,
    })
}

// ── Load operations ─────────────────────────────────────────────────────────

/// True iff no dataset has ever been loaded into this store.
pub async fn is_empty(conn: &Connection) -> Result<bool, TransactionError> {
    conn.run_transaction(&[StoreName::Meta], TransactionMode::ReadOnly, |txn| {
        Ok(txn.meta_get(KEY_URL)?.is_none())
    })
    .await
}

/// True iff the store already holds the dataset identified by
/// `(url, eTag)`. Fast path only: runs outside any write transaction, so a
/// `false` may be stale by the time the caller acts on it. [`load_data`]
/// re-checks authoritatively.
pub async fn has_data(conn: &Connection, url: &str, etag: &str) -> Result<bool, TransactionError> {
    conn.run_transaction(&[StoreName::Meta], TransactionMode::ReadOnly, |txn| {
        Ok(txn.meta_get(KEY_ETAG)?.as_deref() == Some(etag)
            && txn.meta_get(KEY_URL)?.as_deref() == Some(url))
    })
    .await
}

/// Replace the whole dataset with `bytes`, recording `(url, eTag)` as its
/// identity. All-or-nothing: any failure leaves the previous dataset (or
/// the empty state) untouched. Calling it again with the same pair is a
/// no-op that commits nothing.
pub async fn load_data(
    conn: &Connection,
    bytes: &[u8],
    url: &str,
    etag: &str,
) -> Result<(), LoadError> {
    let records = transform_dataset(bytes)?;

    conn.run_transaction(
        &[StoreName::Emoji, StoreName::Meta],
        TransactionMode::ReadWrite,
        move |txn| {
            // Authoritative staleness re-check. The transaction began
            // after the writer lock was taken, so whatever another
            // connection committed in the meantime is visible here.
            let current = txn.meta_get(KEY_ETAG)?.as_deref() == Some(etag)
                && txn.meta_get(KEY_URL)?.as_deref() == Some(url);
            if current {
                tracing::debug!(url, etag, "dataset already present, load skipped");
                return Ok(());
            }

            if txn.emoji_count()? > 0 {
                txn.clear_emoji()?;
            }
            let count = records.len();
            for record in records {
                txn.insert_emoji(record)?;
            }
            txn.meta_put(KEY_ETAG, etag)?;
            txn.meta_put(KEY_URL, url)?;
            tracing::debug!(url, etag, records = count, "dataset staged for commit");
            Ok(())
        },
    )
    .await
    .map_err(LoadError::from)
}
