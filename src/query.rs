//! The four read operations.
//!
//! Every operation pins one committed snapshot, so results never mix two
//! dataset versions. Empty and not-found results are normal returns, not
//! errors.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::connection::{Connection, TransactionMode};
use crate::error::{QueryError, TransactionError};
use crate::schema::StoreName;
use crate::store::state::Slot;
use crate::store::types::EmojiRecord;
use crate::tokens::{extract_tokens, normalize};

/// All records with `group == group`, ascending by `order`.
///
/// The composite index makes this a single range scan over
/// `[(group, 0), (group + 1, 0))`; the sort order falls out of the index.
pub async fn get_emoji_by_group(
    conn: &Connection,
    group: u32,
) -> Result<Vec<EmojiRecord>, QueryError> {
    conn.run_transaction(&[StoreName::Emoji], TransactionMode::ReadOnly, |txn| {
        txn.emoji_by_group(group)
    })
    .await
    .map_err(QueryError::from)
}

/// Primary-key lookup. `None` when the sequence is unknown.
pub async fn get_emoji_by_unicode(
    conn: &Connection,
    unicode: &str,
) -> Result<Option<EmojiRecord>, QueryError> {
    conn.run_transaction(&[StoreName::Emoji], TransactionMode::ReadOnly, |txn| {
        txn.emoji_by_unicode(unicode)
    })
    .await
    .map_err(QueryError::from)
}

/// Exact shortcode lookup.
///
/// Reuses the token index instead of a dedicated shortcode index: the
/// lowercased shortcode is looked up as a token, and candidates that
/// merely share the token (without actually listing the shortcode) are
/// filtered out. Returns the first real match in insertion order.
pub async fn get_emoji_by_shortcode(
    conn: &Connection,
    shortcode: &str,
) -> Result<Option<EmojiRecord>, QueryError> {
    let wanted = normalize(shortcode);
    conn.run_transaction(&[StoreName::Emoji], TransactionMode::ReadOnly, move |txn| {
        let candidates = txn.emoji_by_token(&wanted)?;
        Ok(candidates
            .into_iter()
            .find(|record| record.shortcodes.iter().any(|code| code == &wanted)))
    })
    .await
    .map_err(QueryError::from)
}

/// Multi-token AND search with the last token matched as a prefix.
///
/// The query is tokenized with the same rules applied at load time. Each
/// token's posting list is fetched in its own task; completion order is
/// not guaranteed and the intersection does not depend on it. The
/// smallest posting list is the candidate pool, every other list acts as
/// a filter. Results come back ascending by `order`.
pub async fn get_emoji_by_search_query(
    conn: &Connection,
    query: &str,
) -> Result<Vec<EmojiRecord>, QueryError> {
    let tokens = extract_tokens(query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    // One pinned snapshot for every lookup; intersecting posting lists
    // from different committed versions would be meaningless.
    let state = conn.read_state().await.map_err(QueryError::from)?;

    let last = tokens.len() - 1;
    let mut lookups = JoinSet::new();
    for (position, token) in tokens.into_iter().enumerate() {
        let state = Arc::clone(&state);
        lookups.spawn(async move {
            let slots = if position == last {
                state.postings_prefix(&token)
            } else {
                state.postings_exact(&token)
            };
            (position, slots)
        });
    }

    let mut sets: Vec<Option<Vec<Slot>>> = vec![None; last + 1];
    while let Some(joined) = lookups.join_next().await {
        let (position, slots) = joined.map_err(TransactionError::from)?;
        sets[position] = Some(slots);
    }
    let sets: Vec<Vec<Slot>> = sets.into_iter().flatten().collect();

    let mut hits = state.resolve(&intersect(&sets));
    hits.sort_by_key(|record| record.order);
    Ok(hits)
}

/// AND-intersect ascending slot lists: the smallest list is the candidate
/// pool, a candidate survives only if every other list contains it.
fn intersect(sets: &[Vec<Slot>]) -> Vec<Slot> {
    let Some((pool_index, pool)) = sets.iter().enumerate().min_by_key(|(_, set)| set.len())
    else {
        return Vec::new();
    };
    pool.iter()
        .copied()
        .filter(|slot| {
            sets.iter()
                .enumerate()
                .all(|(index, set)| index == pool_index || set.binary_search(slot).is_ok())
        })
        .collect()
}
