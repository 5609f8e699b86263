//! Snapshot persistence and the CURRENT pointer.
//!
//! Every commit writes a complete snapshot file and then swaps the pointer:
//!
//! ```text
//! 1. snap_<v+1>.bin        write + fsync (invisible until step 2)
//! 2. current.json.tmp      write + fsync
//! 3. rename -> current.json  (atomic)
//! 4. unlink stale snap_*.bin (best effort)
//! ```
//!
//! Readers resolve the pointer before every transaction, so a crash at any
//! step leaves them on the previous version; the worst outcome is one
//! orphaned snapshot file, which the next commit's sweep removes.
//!
//! All functions here do blocking IO and are called from
//! `spawn_blocking` by the connection layer.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TransactionError;
use crate::schema::{
    CURRENT_FILE, FORMAT_VERSION, SCHEMA_VERSION, SNAPSHOT_EXT, SNAPSHOT_MAGIC, SNAPSHOT_PREFIX,
};
use crate::store::lock::StoreLock;
use crate::store::state::StoreState;
use crate::store::types::EmojiRecord;

/// Contents of `current.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    /// Store layout version, checked against [`SCHEMA_VERSION`] on read.
    pub schema_version: u16,
    /// Monotonic commit counter. 0 means created but never loaded.
    pub version: u64,
    /// Snapshot file holding this version. `None` only at version 0.
    pub file: Option<String>,
}

impl CurrentPointer {
    fn fresh() -> Self {
        CurrentPointer {
            schema_version: SCHEMA_VERSION,
            version: 0,
            file: None,
        }
    }
}

/// What goes into a snapshot file. Indexes are derived state and stay out.
#[derive(Serialize)]
struct SnapshotPayloadRef<'a> {
    meta: &'a BTreeMap<String, String>,
    records: &'a [EmojiRecord],
}

#[derive(Deserialize)]
struct SnapshotPayload {
    meta: BTreeMap<String, String>,
    records: Vec<EmojiRecord>,
}

/// Create the store directory and pointer file if they do not exist yet.
/// Runs under the writer lock so two processes racing the first open
/// cannot clobber each other's pointer.
pub fn init_store(dir: &Path) -> Result<CurrentPointer, TransactionError> {
    fs::create_dir_all(dir)?;
    let _lock = StoreLock::acquire_exclusive(dir)?;
    if dir.join(CURRENT_FILE).exists() {
        read_pointer(dir)
    } else {
        let pointer = CurrentPointer::fresh();
        write_pointer(dir, &pointer)?;
        Ok(pointer)
    }
}

/// Read and validate the pointer file.
pub fn read_pointer(dir: &Path) -> Result<CurrentPointer, TransactionError> {
    let text = fs::read_to_string(dir.join(CURRENT_FILE))?;
    let pointer: CurrentPointer = serde_json::from_str(&text)?;
    if pointer.schema_version != SCHEMA_VERSION {
        return Err(TransactionError::SchemaVersion {
            found: pointer.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(pointer)
}

/// Atomically replace the pointer file: write a sibling tmp file, fsync,
/// rename over the target.
pub fn write_pointer(dir: &Path, pointer: &CurrentPointer) -> Result<(), TransactionError> {
    let tmp = dir.join(format!("{CURRENT_FILE}.tmp"));
    let mut file = File::create(&tmp)?;
    file.write_all(serde_json::to_string_pretty(pointer)?.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, dir.join(CURRENT_FILE))?;
    sync_dir(dir);
    Ok(())
}

/// Load the state a pointer refers to, re-validating structure and
/// constraints along the way.
pub fn resolve_state(dir: &Path, pointer: &CurrentPointer) -> Result<StoreState, TransactionError> {
    match &pointer.file {
        None => Ok(StoreState::default()),
        Some(file) => {
            let (records, meta) = read_snapshot(dir, file)?;
            StoreState::from_parts(records, meta)
        }
    }
}

const POINTER_RELOAD_ATTEMPTS: usize = 8;

/// Read the pointer and decode the snapshot it names.
///
/// Lock-free readers can lose a race: between reading the pointer and
/// opening the snapshot, a commit may replace the pointer and sweep the
/// old file. A missing snapshot therefore means "pointer moved", and the
/// whole sequence is retried against the new pointer. Writers resolve
/// under the store lock and never need this.
pub fn load_current(dir: &Path) -> Result<(CurrentPointer, StoreState), TransactionError> {
    let mut last = None;
    for _ in 0..POINTER_RELOAD_ATTEMPTS {
        let pointer = read_pointer(dir)?;
        match resolve_state(dir, &pointer) {
            Ok(state) => return Ok((pointer, state)),
            Err(TransactionError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    version = pointer.version,
                    "snapshot swept mid-read, reloading pointer"
                );
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last
        .map(TransactionError::Io)
        .unwrap_or_else(|| TransactionError::Corrupt("snapshot kept disappearing".into())))
}

pub fn snapshot_file_name(version: u64) -> String {
    format!("{SNAPSHOT_PREFIX}{version:06}.{SNAPSHOT_EXT}")
}

/// Write `state` as the snapshot for `version` and fsync it. The file is
/// not live until the pointer names it.
pub fn write_snapshot(
    dir: &Path,
    version: u64,
    state: &StoreState,
) -> Result<String, TransactionError> {
    let name = snapshot_file_name(version);
    let mut writer = BufWriter::new(File::create(dir.join(&name))?);
    writer.write_all(&SNAPSHOT_MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    bincode::serialize_into(
        &mut writer,
        &SnapshotPayloadRef {
            meta: state.meta_all(),
            records: state.records_all(),
        },
    )?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(name)
}

fn read_snapshot(
    dir: &Path,
    file: &str,
) -> Result<(Vec<EmojiRecord>, BTreeMap<String, String>), TransactionError> {
    let bytes = fs::read(dir.join(file))?;
    let header = SNAPSHOT_MAGIC.len() + 2;
    if bytes.len() < header {
        return Err(TransactionError::Corrupt(format!(
            "snapshot {file} truncated ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(TransactionError::Corrupt(format!(
            "snapshot {file} has wrong magic"
        )));
    }
    let format = u16::from_le_bytes([bytes[4], bytes[5]]);
    if format != FORMAT_VERSION {
        return Err(TransactionError::Corrupt(format!(
            "snapshot {file} uses unsupported format {format}"
        )));
    }
    let payload: SnapshotPayload = bincode::deserialize(&bytes[header..])?;
    Ok((payload.records, payload.meta))
}

/// Remove snapshot files other than the one the pointer names. Failures
/// are logged and ignored; a leftover file costs disk space, not
/// correctness.
pub fn collect_garbage(dir: &Path, keep: &CurrentPointer) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "snapshot sweep skipped");
            return 0;
        }
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_snapshot =
            name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(&format!(".{SNAPSHOT_EXT}"));
        if !is_snapshot || keep.file.as_deref() == Some(name) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(file = name, error = %e, "failed to remove stale snapshot"),
        }
    }
    removed
}

fn sync_dir(dir: &Path) {
    // Persists the rename itself. Not supported everywhere, so best effort.
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "directory fsync unavailable");
    }
}
