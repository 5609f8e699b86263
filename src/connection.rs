//! Connection lifecycle and transaction execution.
//!
//! A `Connection` is the handle to one store directory: a cached image of
//! the latest committed snapshot plus the gates writers queue on. All
//! synchronization in the crate happens here; the operations in
//! [`crate::loader`] and [`crate::query`] are plain functions over a
//! connection.
//!
//! # Isolation model
//!
//! - Read transactions re-resolve the CURRENT pointer, pin the matching
//!   immutable [`StoreState`] and run entirely against it. Concurrent
//!   commits are invisible to a transaction already underway.
//! - Write transactions additionally hold the cross-process flock for
//!   their whole duration and re-resolve the pointer *after* acquiring
//!   it. The work closure therefore always sees the authoritative latest
//!   state, which is what lets the bulk loader's in-transaction staleness
//!   re-check detect a load that another connection has just finished.
//! - A write commits only if the closure mutated something and returned
//!   `Ok`; an error aborts with the previous snapshot still live.
//! - Dropping an in-flight write future cannot interrupt a commit that
//!   already started: the writer locks move into the commit task and
//!   release only after the pointer swap.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::{OpenError, TransactionError};
use crate::schema::{StoreName, SCHEMA_VERSION};
use crate::store::lock::StoreLock;
use crate::store::manifest::{self, CurrentPointer};
use crate::store::state::{StoreDraft, StoreState};
use crate::store::types::EmojiRecord;

/// Access mode of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; write operations fail with [`TransactionError::ReadOnly`].
    ReadOnly,
    /// Reads and writes; commits atomically on success.
    ReadWrite,
}

impl TransactionMode {
    pub fn is_write(&self) -> bool {
        matches!(self, TransactionMode::ReadWrite)
    }
}

/// The stores a transaction declared up front. Touching anything else
/// fails.
#[derive(Debug, Clone, Copy, Default)]
struct StoreScope {
    emoji: bool,
    meta: bool,
}

impl StoreScope {
    fn new(stores: &[StoreName]) -> Self {
        let mut scope = StoreScope::default();
        for store in stores {
            match store {
                StoreName::Emoji => scope.emoji = true,
                StoreName::Meta => scope.meta = true,
            }
        }
        scope
    }

    fn check(&self, store: StoreName) -> Result<(), TransactionError> {
        let declared = match store {
            StoreName::Emoji => self.emoji,
            StoreName::Meta => self.meta,
        };
        if declared {
            Ok(())
        } else {
            Err(TransactionError::OutOfScope(store.as_str()))
        }
    }
}

#[derive(Debug)]
struct CachedState {
    version: u64,
    state: Arc<StoreState>,
}

#[derive(Debug)]
struct ConnectionInner {
    dir: PathBuf,
    /// Image of the newest snapshot this connection has seen.
    cache: RwLock<CachedState>,
    /// In-process writer queue. The flock then serializes across
    /// processes; this keeps our own writers from all parking blocking
    /// threads on the kernel lock. Shared so the commit task can carry
    /// its guard past the end of the awaiting future.
    write_gate: Arc<tokio::sync::Mutex<()>>,
}

/// Handle to an open store. Cheap to clone; clones share the cache and
/// writer queue.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Open the store at `dir`, creating the directory, pointer file and
    /// an empty version 0 on first use. Validates the layout version and
    /// loads the current snapshot.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Connection, OpenError> {
        let dir = dir.into();
        let blocking_dir = dir.clone();
        let (pointer, state) = tokio::task::spawn_blocking(
            move || -> Result<(CurrentPointer, StoreState), TransactionError> {
                manifest::init_store(&blocking_dir)?;
                manifest::load_current(&blocking_dir)
            },
        )
        .await?
        .map_err(open_error)?;

        tracing::debug!(
            dir = %dir.display(),
            version = pointer.version,
            records = state.emoji_count(),
            "store opened"
        );

        Ok(Connection {
            inner: Arc::new(ConnectionInner {
                dir,
                cache: RwLock::new(CachedState {
                    version: pointer.version,
                    state: Arc::new(state),
                }),
                write_gate: Arc::new(tokio::sync::Mutex::new(())),
            }),
        })
    }

    /// Pin the newest committed state, refreshing the cache if another
    /// connection or process has committed since we last looked.
    pub(crate) async fn read_state(&self) -> Result<Arc<StoreState>, TransactionError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || refresh(&inner)).await?
    }

    /// Run `work` as one transaction over the declared stores.
    ///
    /// The closure runs at most once. For `ReadWrite` it runs against a
    /// draft of the latest state; the draft is committed as a new
    /// snapshot only when the closure returns `Ok` *and* actually
    /// changed something. An untouched draft commits nothing.
    pub async fn run_transaction<T, F>(
        &self,
        stores: &[StoreName],
        mode: TransactionMode,
        work: F,
    ) -> Result<T, TransactionError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, TransactionError>,
    {
        let scope = StoreScope::new(stores);
        match mode {
            TransactionMode::ReadOnly => {
                let state = self.read_state().await?;
                let mut txn = Transaction {
                    mode,
                    scope,
                    view: TxnView::Read(state),
                };
                work(&mut txn)
            }
            TransactionMode::ReadWrite => self.run_write(scope, work).await,
        }
    }

    async fn run_write<T, F>(&self, scope: StoreScope, work: F) -> Result<T, TransactionError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, TransactionError>,
    {
        let gate = self.inner.write_gate.clone().lock_owned().await;

        // Take the cross-process lock, then re-resolve the pointer under
        // it: anything committed before we got the lock is visible now.
        let inner = self.inner.clone();
        let (lock, pointer, base) = tokio::task::spawn_blocking(
            move || -> Result<(StoreLock, CurrentPointer, StoreState), TransactionError> {
                let lock = StoreLock::acquire_exclusive(&inner.dir)?;
                let pointer = manifest::read_pointer(&inner.dir)?;
                let base = manifest::resolve_state(&inner.dir, &pointer)?;
                Ok((lock, pointer, base))
            },
        )
        .await??;

        let mut txn = Transaction {
            mode: TransactionMode::ReadWrite,
            scope,
            view: TxnView::Write(StoreDraft::from_state(&base)),
        };

        let out = match work(&mut txn) {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(error = %e, "write transaction aborted");
                return Err(e);
            }
        };

        let Some(draft) = txn.into_draft() else {
            return Ok(out);
        };
        if !draft.is_dirty() {
            tracing::debug!("write transaction made no changes, commit skipped");
            return Ok(out);
        }

        let state = draft.into_state();
        let next_version = pointer.version + 1;
        let inner = self.inner.clone();
        let (pointer, state) = tokio::task::spawn_blocking(
            move || -> Result<(CurrentPointer, StoreState), TransactionError> {
                let file = manifest::write_snapshot(&inner.dir, next_version, &state)?;
                let pointer = CurrentPointer {
                    schema_version: SCHEMA_VERSION,
                    version: next_version,
                    file: Some(file),
                };
                manifest::write_pointer(&inner.dir, &pointer)?;
                let swept = manifest::collect_garbage(&inner.dir, &pointer);
                if swept > 0 {
                    tracing::debug!(swept, "removed stale snapshots");
                }
                // Gates release here, after the swap and sweep, even if
                // the future awaiting this task has been dropped.
                drop(lock);
                drop(gate);
                Ok((pointer, state))
            },
        )
        .await??;

        tracing::debug!(
            version = pointer.version,
            records = state.emoji_count(),
            "transaction committed"
        );

        let mut cache = self.inner.cache.write().unwrap();
        if pointer.version > cache.version {
            *cache = CachedState {
                version: pointer.version,
                state: Arc::new(state),
            };
        }
        Ok(out)
    }
}

/// Re-read the pointer and reload the snapshot if it moved. Blocking.
fn refresh(inner: &ConnectionInner) -> Result<Arc<StoreState>, TransactionError> {
    let pointer = manifest::read_pointer(&inner.dir)?;
    {
        let cache = inner.cache.read().unwrap();
        if cache.version == pointer.version {
            return Ok(cache.state.clone());
        }
    }

    let (pointer, state) = manifest::load_current(&inner.dir)?;
    let state = Arc::new(state);
    let mut cache = inner.cache.write().unwrap();
    // Someone else may have refreshed to this or a newer version while we
    // were decoding.
    if pointer.version > cache.version {
        *cache = CachedState {
            version: pointer.version,
            state: state.clone(),
        };
        Ok(state)
    } else {
        Ok(cache.state.clone())
    }
}

fn open_error(e: TransactionError) -> OpenError {
    match e {
        TransactionError::Io(e) => OpenError::Io(e),
        TransactionError::Pointer(e) => OpenError::CorruptPointer(e),
        TransactionError::SchemaVersion { found, expected } => {
            OpenError::SchemaVersion { found, expected }
        }
        TransactionError::Join(e) => OpenError::Join(e),
        other => OpenError::CorruptSnapshot(other.to_string()),
    }
}

enum TxnView {
    Read(Arc<StoreState>),
    Write(StoreDraft),
}

/// Handle the work closure gets. Every accessor enforces the declared
/// scope; write accessors additionally require `ReadWrite` mode.
pub struct Transaction {
    mode: TransactionMode,
    scope: StoreScope,
    view: TxnView,
}

impl Transaction {
    fn view(&self) -> &StoreState {
        match &self.view {
            TxnView::Read(state) => state,
            TxnView::Write(draft) => draft.state(),
        }
    }

    fn draft_mut(&mut self) -> Result<&mut StoreDraft, TransactionError> {
        if !self.mode.is_write() {
            return Err(TransactionError::ReadOnly);
        }
        match &mut self.view {
            TxnView::Write(draft) => Ok(draft),
            TxnView::Read(_) => Err(TransactionError::ReadOnly),
        }
    }

    fn into_draft(self) -> Option<StoreDraft> {
        match self.view {
            TxnView::Write(draft) => Some(draft),
            TxnView::Read(_) => None,
        }
    }

    // -- Meta store ---------------------------------------------------------

    pub fn meta_get(&self, key: &str) -> Result<Option<String>, TransactionError> {
        self.scope.check(StoreName::Meta)?;
        Ok(self.view().meta_get(key).map(str::to_string))
    }

    pub fn meta_put(&mut self, key: &str, value: &str) -> Result<(), TransactionError> {
        self.scope.check(StoreName::Meta)?;
        self.draft_mut()?.meta_put(key, value);
        Ok(())
    }

    // -- Emoji store --------------------------------------------------------

    pub fn emoji_count(&self) -> Result<usize, TransactionError> {
        self.scope.check(StoreName::Emoji)?;
        Ok(self.view().emoji_count())
    }

    pub fn emoji_by_unicode(&self, unicode: &str) -> Result<Option<EmojiRecord>, TransactionError> {
        self.scope.check(StoreName::Emoji)?;
        Ok(self.view().get_by_unicode(unicode).cloned())
    }

    /// Records of one group, ascending by order.
    pub fn emoji_by_group(&self, group: u32) -> Result<Vec<EmojiRecord>, TransactionError> {
        self.scope.check(StoreName::Emoji)?;
        let view = self.view();
        Ok(view.resolve(&view.scan_group(group)))
    }

    /// Records carrying `token` exactly, in insertion order.
    pub fn emoji_by_token(&self, token: &str) -> Result<Vec<EmojiRecord>, TransactionError> {
        self.scope.check(StoreName::Emoji)?;
        let view = self.view();
        Ok(view.resolve(&view.postings_exact(token)))
    }

    /// Delete every emoji record. Meta is untouched.
    pub fn clear_emoji(&mut self) -> Result<(), TransactionError> {
        self.scope.check(StoreName::Emoji)?;
        self.draft_mut()?.clear_emoji();
        Ok(())
    }

    /// Insert one record, enforcing unique `unicode` and unique
    /// `(group, order)`.
    pub fn insert_emoji(&mut self, record: EmojiRecord) -> Result<(), TransactionError> {
        self.scope.check(StoreName::Emoji)?;
        self.draft_mut()?.insert_emoji(record)
    }
}
