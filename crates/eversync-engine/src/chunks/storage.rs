//! On-disk sync chunk cache
//!
//! Downloaded sync chunks are persisted under a root directory so an
//! interrupted sync can resume without re-downloading:
//!
//! ```text
//! <root>/user_own/<lo>_<hi>          one JSON-serialized chunk per file
//! <root>/<linked_notebook_guid>/<lo>_<hi>
//! ```
//!
//! File names carry the chunk's USN range; ranges within one scope never
//! overlap. Putting a chunk whose range overlaps an existing stored range
//! clears the whole scope, since that can only mean a prior sync failed
//! and must restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::warn;

use eversync_core::domain::{Guid, SyncChunk, Usn};
use eversync_core::errors::CoreError;

use super::utils;

const USER_OWN_DIR_NAME: &str = "user_own";

/// A chunk staged for persistence, with its precomputed USN range
#[derive(Debug, Clone)]
struct ChunkInfo {
    chunk: SyncChunk,
    low_usn: Usn,
    high_usn: Usn,
}

#[derive(Debug, Default)]
struct StorageState {
    initialized: bool,
    user_own_usn_ranges: Vec<(Usn, Usn)>,
    linked_notebook_usn_ranges: HashMap<Guid, Vec<(Usn, Usn)>>,
    user_own_pending: Vec<ChunkInfo>,
    linked_notebook_pending: HashMap<Guid, Vec<ChunkInfo>>,
}

/// On-disk cache of sync chunks, per scope
///
/// The in-memory USN-range index is guarded by a reader/writer lock; the
/// directory scan populating it runs lazily on first access. Chunks put
/// into the storage are held in memory until [`SyncChunksStorage::flush`]
/// writes them out, and the fetch path sees them either way.
pub struct SyncChunksStorage {
    root_dir: PathBuf,
    user_own_dir: PathBuf,
    state: RwLock<StorageState>,
}

impl SyncChunksStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root_dir = root_dir.into();
        let user_own_dir = root_dir.join(USER_OWN_DIR_NAME);

        fs::create_dir_all(&user_own_dir).map_err(|e| {
            CoreError::RuntimeError(format!(
                "cannot create sync chunks storage dir {}: {e}",
                user_own_dir.display()
            ))
        })?;

        let metadata = fs::metadata(&root_dir).map_err(|e| {
            CoreError::InvalidArgument(format!(
                "sync chunks storage root dir is not accessible: {e}"
            ))
        })?;
        if metadata.permissions().readonly() {
            return Err(CoreError::InvalidArgument(
                "sync chunks storage requires a writable root dir".into(),
            ));
        }

        Ok(Self {
            root_dir,
            user_own_dir,
            state: RwLock::new(StorageState::default()),
        })
    }

    /// Sorted `(lo, hi)` ranges of the stored user-own chunks
    pub fn fetch_user_own_usn_ranges(&self) -> Vec<(Usn, Usn)> {
        self.ensure_initialized();
        self.state.read().unwrap().user_own_usn_ranges.clone()
    }

    /// Sorted `(lo, hi)` ranges of one linked notebook's stored chunks
    pub fn fetch_linked_notebook_usn_ranges(&self, linked_notebook_guid: &Guid) -> Vec<(Usn, Usn)> {
        self.ensure_initialized();
        self.state
            .read()
            .unwrap()
            .linked_notebook_usn_ranges
            .get(linked_notebook_guid)
            .cloned()
            .unwrap_or_default()
    }

    /// Deserialized user-own chunks whose high USN exceeds `after_usn`
    ///
    /// A chunk straddling `after_usn` (its `lo <= after_usn < hi`) is
    /// filtered in place: entities with `USN <= after_usn` are dropped.
    pub fn fetch_relevant_user_own_chunks(&self, after_usn: Usn) -> Vec<SyncChunk> {
        self.ensure_initialized();
        let state = self.state.read().unwrap();

        let mut result = fetch_relevant_chunks_from_dir(&self.user_own_dir, after_usn);
        append_pending_chunks(&state.user_own_pending, after_usn, &mut result);
        result
    }

    /// Linked-notebook variant of
    /// [`SyncChunksStorage::fetch_relevant_user_own_chunks`]
    pub fn fetch_relevant_linked_notebook_chunks(
        &self,
        linked_notebook_guid: &Guid,
        after_usn: Usn,
    ) -> Vec<SyncChunk> {
        self.ensure_initialized();
        let state = self.state.read().unwrap();

        let dir = self.root_dir.join(linked_notebook_guid.as_str());
        let mut result = if dir.is_dir() {
            fetch_relevant_chunks_from_dir(&dir, after_usn)
        } else {
            Vec::new()
        };

        if let Some(pending) = state.linked_notebook_pending.get(linked_notebook_guid) {
            append_pending_chunks(pending, after_usn, &mut result);
        }

        result
    }

    /// Stages user-own chunks for persistence
    ///
    /// If any new chunk's range overlaps an already stored range the whole
    /// user-own scope is cleared instead: overlapping ranges signal a
    /// failed previous sync whose leftovers must not be mixed with the
    /// fresh download.
    pub fn put_user_own_chunks(&self, chunks: Vec<SyncChunk>) {
        self.ensure_initialized();
        let mut state = self.state.write().unwrap();

        let infos = to_chunk_infos(chunks);
        let ranges: Vec<(Usn, Usn)> = infos.iter().map(|i| (i.low_usn, i.high_usn)).collect();
        state.user_own_pending.extend(infos);

        if let Some(&(_, last_hi)) = state.user_own_usn_ranges.last() {
            if ranges.iter().any(|&(lo, _)| lo <= last_hi) {
                drop(state);
                self.clear_user_own_chunks();
                return;
            }
        }

        state.user_own_usn_ranges.extend(ranges);
        state.user_own_usn_ranges.sort_unstable();
    }

    /// Linked-notebook variant of [`SyncChunksStorage::put_user_own_chunks`]
    pub fn put_linked_notebook_chunks(&self, linked_notebook_guid: &Guid, chunks: Vec<SyncChunk>) {
        self.ensure_initialized();
        let mut state = self.state.write().unwrap();

        let infos = to_chunk_infos(chunks);
        let ranges: Vec<(Usn, Usn)> = infos.iter().map(|i| (i.low_usn, i.high_usn)).collect();
        state
            .linked_notebook_pending
            .entry(linked_notebook_guid.clone())
            .or_default()
            .extend(infos);

        if ranges.is_empty() {
            return;
        }

        if let Some(&(_, last_hi)) = state
            .linked_notebook_usn_ranges
            .get(linked_notebook_guid)
            .and_then(|ranges| ranges.last())
        {
            if ranges.iter().any(|&(lo, _)| lo <= last_hi) {
                drop(state);
                self.clear_linked_notebook_chunks(linked_notebook_guid);
                return;
            }
        }

        let stored = state
            .linked_notebook_usn_ranges
            .entry(linked_notebook_guid.clone())
            .or_default();
        stored.extend(ranges);
        stored.sort_unstable();
    }

    /// Removes all stored and pending user-own chunks
    pub fn clear_user_own_chunks(&self) {
        self.ensure_initialized();
        let mut state = self.state.write().unwrap();
        state.user_own_pending.clear();
        state.user_own_usn_ranges.clear();
        remove_dir_contents(&self.user_own_dir);
    }

    /// Removes all stored and pending chunks of one linked notebook
    pub fn clear_linked_notebook_chunks(&self, linked_notebook_guid: &Guid) {
        self.ensure_initialized();
        let mut state = self.state.write().unwrap();
        state.linked_notebook_pending.remove(linked_notebook_guid);
        state.linked_notebook_usn_ranges.remove(linked_notebook_guid);

        let dir = self.root_dir.join(linked_notebook_guid.as_str());
        if dir.is_dir() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to remove linked notebook sync chunks dir");
            }
        }
    }

    /// Removes everything: every scope, stored and pending
    pub fn clear_all_chunks(&self) {
        self.ensure_initialized();
        let mut state = self.state.write().unwrap();
        state.user_own_pending.clear();
        state.linked_notebook_pending.clear();
        state.user_own_usn_ranges.clear();
        state.linked_notebook_usn_ranges.clear();
        remove_dir_contents(&self.root_dir);
    }

    /// Writes out every staged chunk that has not been persisted yet
    pub fn flush(&self) {
        self.ensure_initialized();
        let mut state = self.state.write().unwrap();

        for info in state.user_own_pending.drain(..) {
            write_chunk_file(&self.user_own_dir, &info);
        }

        let pending: Vec<(Guid, Vec<ChunkInfo>)> =
            state.linked_notebook_pending.drain().collect();
        for (guid, infos) in pending {
            let dir = self.root_dir.join(guid.as_str());
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "Failed to create dir for linked notebook sync chunks"
                );
                continue;
            }
            for info in infos {
                write_chunk_file(&dir, &info);
            }
        }
    }

    fn ensure_initialized(&self) {
        {
            let state = self.state.read().unwrap();
            if state.initialized {
                return;
            }
        }

        let mut state = self.state.write().unwrap();
        if state.initialized {
            return;
        }

        state.user_own_usn_ranges = detect_chunk_usn_ranges(&self.user_own_dir);

        if let Ok(entries) = fs::read_dir(&self.root_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() || path == self.user_own_dir {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let ranges = detect_chunk_usn_ranges(&path);
                if !ranges.is_empty() {
                    state
                        .linked_notebook_usn_ranges
                        .insert(Guid::new(name), ranges);
                }
            }
        }

        state.initialized = true;
    }
}

/// Parses `<lo>_<hi>` out of a chunk file name
fn split_chunk_file_name_into_usns(file_name: &str) -> Option<(Usn, Usn)> {
    let mut parts = file_name.splitn(2, '_');
    let lo = parts.next()?.parse::<Usn>().ok()?;
    let hi = parts.next()?.parse::<Usn>().ok()?;
    Some((lo, hi))
}

fn detect_chunk_usn_ranges(dir: &Path) -> Vec<(Usn, Usn)> {
    let mut result = Vec::new();

    let Ok(entries) = fs::read_dir(dir) else {
        return result;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match split_chunk_file_name_into_usns(name) {
            Some(range) => result.push(range),
            None => {
                warn!(
                    file = %path.display(),
                    "Detected sync chunk file with wrong name pattern"
                );
            }
        }
    }

    result.sort_unstable();
    result
}

fn deserialize_chunk_file(path: &Path) -> Option<SyncChunk> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to read serialized sync chunk file");
            return None;
        }
    };

    match serde_json::from_slice(&contents) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to deserialize sync chunk from file");
            None
        }
    }
}

fn fetch_relevant_chunks_from_dir(dir: &Path, after_usn: Usn) -> Vec<SyncChunk> {
    let mut result = Vec::new();

    let Ok(entries) = fs::read_dir(dir) else {
        return result;
    };

    let mut files: Vec<(Usn, Usn, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_file() {
                return None;
            }
            let name = path.file_name()?.to_str()?;
            let (lo, hi) = split_chunk_file_name_into_usns(name)?;
            Some((lo, hi, path))
        })
        .collect();
    files.sort_unstable_by_key(|&(lo, hi, _)| (lo, hi));

    for (lo, hi, path) in files {
        if after_usn != 0 && hi <= after_usn {
            continue;
        }

        let Some(mut chunk) = deserialize_chunk_file(&path) else {
            continue;
        };

        if after_usn != 0 && lo <= after_usn {
            utils::filter_low_usns_from_sync_chunk(after_usn, &mut chunk);
        }

        result.push(chunk);
    }

    result
}

fn append_pending_chunks(pending: &[ChunkInfo], after_usn: Usn, result: &mut Vec<SyncChunk>) {
    // Pending chunks are guaranteed not to interleave in their USN ranges
    // with the already persisted ones
    for info in pending {
        if info.high_usn <= after_usn {
            continue;
        }

        if after_usn != 0 && info.low_usn <= after_usn {
            let mut copy = info.chunk.clone();
            utils::filter_low_usns_from_sync_chunk(after_usn, &mut copy);
            result.push(copy);
        } else {
            result.push(info.chunk.clone());
        }
    }
}

fn to_chunk_infos(chunks: Vec<SyncChunk>) -> Vec<ChunkInfo> {
    chunks
        .into_iter()
        .filter_map(|chunk| {
            let high_usn = chunk.chunk_high_usn;
            let low_usn = high_usn.and_then(|_| utils::sync_chunk_low_usn(&chunk));
            match (low_usn, high_usn) {
                (Some(low_usn), Some(high_usn)) => Some(ChunkInfo {
                    chunk,
                    low_usn,
                    high_usn,
                }),
                _ => {
                    warn!("Failed to fetch low and/or high USN for sync chunk, not storing it");
                    None
                }
            }
        })
        .collect()
}

fn write_chunk_file(dir: &Path, info: &ChunkInfo) {
    let path = dir.join(format!("{}_{}", info.low_usn, info.high_usn));
    let serialized = match serde_json::to_vec_pretty(&info.chunk) {
        Ok(serialized) => serialized,
        Err(e) => {
            warn!(error = %e, "Failed to serialize sync chunk");
            return;
        }
    };
    if let Err(e) = fs::write(&path, serialized) {
        warn!(file = %path.display(), error = %e, "Failed to write sync chunk file");
    }
}

fn remove_dir_contents(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let outcome = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = outcome {
            warn!(path = %path.display(), error = %e, "Failed to remove sync chunks entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use eversync_core::domain::Note;

    fn chunk_with_notes(usns: &[Usn], update_count: Usn) -> SyncChunk {
        let mut chunk = SyncChunk::default();
        chunk.update_count = update_count;
        chunk.chunk_high_usn = usns.iter().copied().max();
        chunk.notes = Some(
            usns.iter()
                .map(|&usn| {
                    let mut note = Note::new();
                    note.guid = Some(Guid::new(format!("note-{usn}")));
                    note.update_sequence_num = Some(usn);
                    note.notebook_guid = Some(Guid::new("nb-1"));
                    note
                })
                .collect(),
        );
        chunk
    }

    #[test]
    fn put_and_fetch_user_own_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        storage.put_user_own_chunks(vec![chunk_with_notes(&[1, 2, 3], 10)]);
        storage.put_user_own_chunks(vec![chunk_with_notes(&[4, 5, 6], 10)]);

        assert_eq!(storage.fetch_user_own_usn_ranges(), vec![(1, 3), (4, 6)]);
    }

    #[test]
    fn pending_chunks_are_visible_before_flush_and_survive_it() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        storage.put_user_own_chunks(vec![chunk_with_notes(&[1, 2, 3], 3)]);
        assert_eq!(storage.fetch_relevant_user_own_chunks(0).len(), 1);

        storage.flush();

        // A fresh storage instance over the same dir sees the flushed chunk
        let reopened = SyncChunksStorage::new(dir.path()).unwrap();
        assert_eq!(reopened.fetch_user_own_usn_ranges(), vec![(1, 3)]);
        assert_eq!(reopened.fetch_relevant_user_own_chunks(0).len(), 1);
    }

    #[test]
    fn overlapping_put_clears_the_scope() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        storage.put_user_own_chunks(vec![chunk_with_notes(&[1, 2, 3], 10)]);
        storage.flush();

        // Overlaps the stored [1, 3] range
        storage.put_user_own_chunks(vec![chunk_with_notes(&[3, 4], 10)]);

        assert!(storage.fetch_user_own_usn_ranges().is_empty());
        assert!(storage.fetch_relevant_user_own_chunks(0).is_empty());
    }

    #[test]
    fn straddling_chunk_is_filtered_to_entities_above_after_usn() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        storage.put_user_own_chunks(vec![chunk_with_notes(&[6, 10, 12, 15], 15)]);
        storage.flush();

        let chunks = storage.fetch_relevant_user_own_chunks(10);
        assert_eq!(chunks.len(), 1);
        let usns: Vec<Usn> = chunks[0]
            .notes
            .as_ref()
            .unwrap()
            .iter()
            .map(|n| n.update_sequence_num.unwrap())
            .collect();
        assert_eq!(usns, vec![12, 15]);
        assert_eq!(chunks[0].chunk_high_usn, Some(15));
    }

    #[test]
    fn fetch_relevant_skips_fully_covered_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        storage.put_user_own_chunks(vec![
            chunk_with_notes(&[1, 2, 3], 9),
            chunk_with_notes(&[4, 5, 6], 9),
            chunk_with_notes(&[7, 8, 9], 9),
        ]);
        storage.flush();

        let chunks = storage.fetch_relevant_user_own_chunks(6);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_high_usn, Some(9));
    }

    #[test]
    fn linked_notebook_scopes_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        let lnb_a = Guid::new("lnb-a");
        let lnb_b = Guid::new("lnb-b");

        storage.put_linked_notebook_chunks(&lnb_a, vec![chunk_with_notes(&[1, 2], 2)]);
        storage.put_linked_notebook_chunks(&lnb_b, vec![chunk_with_notes(&[5, 6], 6)]);
        storage.flush();

        assert_eq!(storage.fetch_linked_notebook_usn_ranges(&lnb_a), vec![(1, 2)]);
        assert_eq!(storage.fetch_linked_notebook_usn_ranges(&lnb_b), vec![(5, 6)]);

        storage.clear_linked_notebook_chunks(&lnb_a);
        assert!(storage.fetch_linked_notebook_usn_ranges(&lnb_a).is_empty());
        assert_eq!(storage.fetch_linked_notebook_usn_ranges(&lnb_b), vec![(5, 6)]);
    }

    #[test]
    fn clear_all_removes_every_scope() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        storage.put_user_own_chunks(vec![chunk_with_notes(&[1, 2], 2)]);
        storage.put_linked_notebook_chunks(&Guid::new("lnb"), vec![chunk_with_notes(&[1], 1)]);
        storage.flush();

        storage.clear_all_chunks();

        assert!(storage.fetch_user_own_usn_ranges().is_empty());
        assert!(storage
            .fetch_linked_notebook_usn_ranges(&Guid::new("lnb"))
            .is_empty());

        let reopened = SyncChunksStorage::new(dir.path()).unwrap();
        assert!(reopened.fetch_user_own_usn_ranges().is_empty());
    }

    #[test]
    fn corrupt_chunk_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SyncChunksStorage::new(dir.path()).unwrap();

        fs::write(dir.path().join("user_own").join("1_3"), b"not json").unwrap();
        fs::write(dir.path().join("user_own").join("garbage"), b"{}").unwrap();

        assert_eq!(storage.fetch_user_own_usn_ranges(), vec![(1, 3)]);
        assert!(storage.fetch_relevant_user_own_chunks(0).is_empty());
    }
}
