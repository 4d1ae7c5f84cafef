//! Persistence codec for the cookie file.
//!
//! The on-disk form is a stream of independently decodable JSON records,
//! one per persistent entry, newline separated. Older versions of the
//! format stored a single two-level JSON object; such a file is accepted
//! and treated as empty state so upgrades never fail.

pub(crate) mod lock;

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::store::Entry;

/// Errors from persistence: loading, saving, and file locking.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted cookie file failed to decode.
    #[error("cannot load cookies: {0}")]
    Corrupt(#[source] serde_json::Error),

    /// The advisory file lock stayed contended past the bounded wait.
    #[error("cookie file lock {path} is held by another process")]
    LockContended {
        /// Path of the lock file that could not be acquired.
        path: PathBuf,
    },

    /// `save` was called on a jar that has no backing file.
    #[error("save called on a jar with no backing file")]
    SaveWithoutLoad,

    /// Underlying storage I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Decodes a cookie file's contents into entries.
///
/// An empty (or whitespace-only) file and the legacy single-object format
/// both mean "no prior state". Anything else that fails to decode is
/// [`StoreError::Corrupt`].
pub(crate) fn decode(data: &str) -> Result<Vec<Entry>, StoreError> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for item in serde_json::Deserializer::from_str(data).into_iter::<Entry>() {
        match item {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                if entries.is_empty() && is_legacy_object(data) {
                    debug!("ignoring legacy single-object cookie file");
                    return Ok(Vec::new());
                }
                return Err(StoreError::Corrupt(err));
            }
        }
    }
    Ok(entries)
}

/// Reports whether the whole file is one legacy top-level JSON object.
fn is_legacy_object(data: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(data),
        Ok(serde_json::Value::Object(_))
    )
}

/// Encodes entries as a record stream.
///
/// Non-persistent entries are skipped; deletable entries are written with a
/// blanked value since only their tombstone matters. Records are ordered by
/// id so identical stores produce identical files.
pub(crate) fn encode<'a, W, I>(writer: &mut W, entries: I) -> Result<(), StoreError>
where
    W: io::Write,
    I: Iterator<Item = &'a Entry>,
{
    let mut records: Vec<&Entry> = entries.filter(|e| e.persistent).collect();
    records.sort_by_key(|e| e.id());
    for entry in records {
        let line = if entry.can_delete && !entry.value.is_empty() {
            let mut blanked = entry.clone();
            blanked.value.clear();
            serde_json::to_string(&blanked).map_err(io::Error::other)?
        } else {
            serde_json::to_string(entry).map_err(io::Error::other)?
        };
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
