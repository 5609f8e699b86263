//! In-memory store state and secondary indexes.
//!
//! `StoreState` is the fully-indexed image of one committed snapshot. It is
//! immutable once built: readers pin it behind an `Arc` and keep seeing the
//! same data no matter what writers do. Indexes are rebuilt from the record
//! list whenever a snapshot is decoded; only records and meta go to disk.
//!
//! `StoreDraft` is the mutable working copy a read-write transaction edits.
//! It tracks whether anything actually changed, so a transaction that only
//! looked around commits nothing.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::error::TransactionError;
use crate::store::types::EmojiRecord;

/// Index of a record in [`StoreState::records_all`]. Stable within one
/// snapshot, never reused across snapshots.
pub type Slot = u32;

/// Immutable image of the two stores plus derived indexes.
///
/// Invariants, upheld by construction:
/// - `by_unicode` has exactly one entry per record
/// - `by_group_order` has one entry per record with a group
/// - every posting list in `by_token` is strictly ascending
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// Emoji records in insertion order; a [`Slot`] is a position here.
    records: Vec<EmojiRecord>,
    /// Primary key index.
    by_unicode: HashMap<String, Slot>,
    /// Composite index. Ordered, so a group scan is a range scan that
    /// comes out already sorted by order.
    by_group_order: BTreeMap<(u32, u32), Slot>,
    /// Multi-valued token index.
    by_token: BTreeMap<String, Vec<Slot>>,
    /// Key-value metadata store.
    meta: BTreeMap<String, String>,
}

impl StoreState {
    /// Rebuild a state from persisted parts, re-running every insert-time
    /// constraint. A snapshot that fails these checks is corrupt.
    pub fn from_parts(
        records: Vec<EmojiRecord>,
        meta: BTreeMap<String, String>,
    ) -> Result<Self, TransactionError> {
        let mut state = StoreState {
            meta,
            ..StoreState::default()
        };
        for record in records {
            state.insert_record(record)?;
        }
        Ok(state)
    }

    pub fn emoji_count(&self) -> usize {
        self.records.len()
    }

    pub fn meta_get(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub(crate) fn meta_all(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub(crate) fn records_all(&self) -> &[EmojiRecord] {
        &self.records
    }

    pub fn record(&self, slot: Slot) -> Option<&EmojiRecord> {
        self.records.get(slot as usize)
    }

    pub fn get_by_unicode(&self, unicode: &str) -> Option<&EmojiRecord> {
        self.by_unicode
            .get(unicode)
            .and_then(|&slot| self.record(slot))
    }

    /// Slots of every record in `group`, ascending by order.
    ///
    /// The scan is the half-open key range `[(group, 0), (group + 1, 0))`;
    /// for `group == u32::MAX` the upper bound degrades to unbounded
    /// instead of wrapping.
    pub fn scan_group(&self, group: u32) -> Vec<Slot> {
        let lower = Bound::Included((group, 0u32));
        let upper = match group.checked_add(1) {
            Some(next) => Bound::Excluded((next, 0u32)),
            None => Bound::Unbounded,
        };
        self.by_group_order
            .range((lower, upper))
            .map(|(_, &slot)| slot)
            .collect()
    }

    /// Posting list for an exact token. Ascending; empty when absent.
    pub fn postings_exact(&self, token: &str) -> Vec<Slot> {
        self.by_token.get(token).cloned().unwrap_or_default()
    }

    /// Union of the posting lists of every token starting with `prefix`.
    /// Ascending and deduplicated: one record can match a prefix through
    /// several of its tokens.
    pub fn postings_prefix(&self, prefix: &str) -> Vec<Slot> {
        let mut slots: Vec<Slot> = Vec::new();
        let range = (Bound::Included(prefix), Bound::Unbounded);
        for (token, postings) in self.by_token.range::<str, _>(range) {
            if !token.starts_with(prefix) {
                break;
            }
            slots.extend_from_slice(postings);
        }
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Clone out the records behind `slots`, preserving slot order.
    pub fn resolve(&self, slots: &[Slot]) -> Vec<EmojiRecord> {
        slots
            .iter()
            .filter_map(|&slot| self.record(slot))
            .cloned()
            .collect()
    }

    fn insert_record(&mut self, record: EmojiRecord) -> Result<(), TransactionError> {
        let slot = Slot::try_from(self.records.len())
            .map_err(|_| TransactionError::Constraint("store is full".into()))?;

        if self.by_unicode.contains_key(&record.unicode) {
            return Err(TransactionError::Constraint(format!(
                "duplicate unicode key {:?}",
                record.unicode
            )));
        }
        if let Some(group) = record.group {
            if self.by_group_order.contains_key(&(group, record.order)) {
                return Err(TransactionError::Constraint(format!(
                    "duplicate (group, order) pair ({}, {})",
                    group, record.order
                )));
            }
        }

        self.by_unicode.insert(record.unicode.clone(), slot);
        if let Some(group) = record.group {
            self.by_group_order.insert((group, record.order), slot);
        }
        for token in &record.tokens {
            let postings = self.by_token.entry(token.clone()).or_default();
            // Tokens arrive deduplicated, but a repeat must not corrupt
            // the ascending invariant.
            if postings.last() != Some(&slot) {
                postings.push(slot);
            }
        }
        self.records.push(record);
        Ok(())
    }
}

/// Mutable working copy for one read-write transaction.
#[derive(Debug)]
pub struct StoreDraft {
    state: StoreState,
    dirty: bool,
}

impl StoreDraft {
    pub fn from_state(base: &StoreState) -> Self {
        StoreDraft {
            state: base.clone(),
            dirty: false,
        }
    }

    /// True once any mutation ran. An untouched draft is not committed,
    /// which is what makes a skipped reload a true no-op.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read view of the draft, including uncommitted edits.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn into_state(self) -> StoreState {
        self.state
    }

    /// Drop every emoji record and all derived indexes. Meta is untouched.
    pub fn clear_emoji(&mut self) {
        self.state.records.clear();
        self.state.by_unicode.clear();
        self.state.by_group_order.clear();
        self.state.by_token.clear();
        self.dirty = true;
    }

    pub fn insert_emoji(&mut self, record: EmojiRecord) -> Result<(), TransactionError> {
        self.state.insert_record(record)?;
        self.dirty = true;
        Ok(())
    }

    pub fn meta_put(&mut self, key: &str, value: &str) {
        self.state.meta.insert(key.to_string(), value.to_string());
        self.dirty = true;
    }
}
