//! Sync chunk inspection helpers
//!
//! Entities inside downloaded sync chunks are validated on collection:
//! entries missing the fields the processors depend on (guid, USN, name
//! or owning-note binding depending on the kind) are skipped with a
//! warning rather than failing the whole chunk.

use tracing::warn;

use eversync_core::domain::{
    Guid, LinkedNotebook, Note, Notebook, Resource, SavedSearch, SyncChunk, Tag, Usn,
};

/// The smallest entity USN present in the chunk, across all entity lists
///
/// Expunged guids carry no USN and do not participate. `None` when the
/// chunk has no USN-bearing entities at all.
pub fn sync_chunk_low_usn(chunk: &SyncChunk) -> Option<Usn> {
    let mut low: Option<Usn> = None;

    let mut check = |usn: Option<Usn>| {
        if let Some(usn) = usn {
            if low.map_or(true, |current| current > usn) {
                low = Some(usn);
            }
        }
    };

    for notebook in chunk.notebooks.iter().flatten() {
        check(notebook.update_sequence_num);
    }
    for note in chunk.notes.iter().flatten() {
        check(note.update_sequence_num);
    }
    for tag in chunk.tags.iter().flatten() {
        check(tag.update_sequence_num);
    }
    for search in chunk.searches.iter().flatten() {
        check(search.update_sequence_num);
    }
    for resource in chunk.resources.iter().flatten() {
        check(resource.update_sequence_num);
    }
    for linked_notebook in chunk.linked_notebooks.iter().flatten() {
        check(linked_notebook.update_sequence_num);
    }

    low
}

/// Stamps the linked notebook guid into every notebook and tag entry
///
/// The service omits the linked notebook guid from entries of a linked
/// notebook chunk (it is implied by the request); the processors need it
/// for scope-aware lookups, so it is written in right after download.
pub fn set_linked_notebook_guid_to_sync_chunk_entries(
    linked_notebook_guid: &Guid,
    chunk: &mut SyncChunk,
) {
    if let Some(notebooks) = chunk.notebooks.as_mut() {
        for notebook in notebooks.iter_mut() {
            notebook.linked_notebook_guid = Some(linked_notebook_guid.clone());
        }
    }

    if let Some(tags) = chunk.tags.as_mut() {
        for tag in tags.iter_mut() {
            tag.linked_notebook_guid = Some(linked_notebook_guid.clone());
        }
    }
}

/// Removes USN-bearing entities with `USN <= after_usn` from every list,
/// collapsing emptied lists to `None`
pub fn filter_low_usns_from_sync_chunk(after_usn: Usn, chunk: &mut SyncChunk) {
    fn filter<T>(items: &mut Option<Vec<T>>, usn_of: impl Fn(&T) -> Option<Usn>, after_usn: Usn) {
        if let Some(list) = items.as_mut() {
            list.retain(|item| usn_of(item).map_or(true, |usn| usn > after_usn));
            if list.is_empty() {
                *items = None;
            }
        }
    }

    filter(&mut chunk.notes, |n: &Note| n.update_sequence_num, after_usn);
    filter(
        &mut chunk.notebooks,
        |n: &Notebook| n.update_sequence_num,
        after_usn,
    );
    filter(&mut chunk.tags, |t: &Tag| t.update_sequence_num, after_usn);
    filter(
        &mut chunk.searches,
        |s: &SavedSearch| s.update_sequence_num,
        after_usn,
    );
    filter(
        &mut chunk.resources,
        |r: &Resource| r.update_sequence_num,
        after_usn,
    );
    filter(
        &mut chunk.linked_notebooks,
        |l: &LinkedNotebook| l.update_sequence_num,
        after_usn,
    );
}

pub fn collect_notebooks_from_sync_chunk(chunk: &SyncChunk) -> Vec<Notebook> {
    let Some(notebooks) = chunk.notebooks.as_ref() else {
        return Vec::new();
    };

    notebooks
        .iter()
        .filter(|notebook| {
            if notebook.guid.is_none() {
                warn!(?notebook.name, "Detected notebook without guid in sync chunk, skipping it");
                return false;
            }
            if notebook.update_sequence_num.is_none() {
                warn!(?notebook.guid, "Detected notebook without USN in sync chunk, skipping it");
                return false;
            }
            if notebook.name.is_none() {
                warn!(?notebook.guid, "Detected notebook without name in sync chunk, skipping it");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub fn collect_tags_from_sync_chunk(chunk: &SyncChunk) -> Vec<Tag> {
    let Some(tags) = chunk.tags.as_ref() else {
        return Vec::new();
    };

    tags.iter()
        .filter(|tag| {
            if tag.guid.is_none() {
                warn!(?tag.name, "Detected tag without guid in sync chunk, skipping it");
                return false;
            }
            if tag.update_sequence_num.is_none() {
                warn!(?tag.guid, "Detected tag without USN in sync chunk, skipping it");
                return false;
            }
            if tag.name.is_none() {
                warn!(?tag.guid, "Detected tag without name in sync chunk, skipping it");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub fn collect_saved_searches_from_sync_chunk(chunk: &SyncChunk) -> Vec<SavedSearch> {
    let Some(searches) = chunk.searches.as_ref() else {
        return Vec::new();
    };

    searches
        .iter()
        .filter(|search| {
            if search.guid.is_none() {
                warn!(?search.name, "Detected saved search without guid in sync chunk, skipping it");
                return false;
            }
            if search.update_sequence_num.is_none() {
                warn!(?search.guid, "Detected saved search without USN in sync chunk, skipping it");
                return false;
            }
            if search.name.is_none() {
                warn!(?search.guid, "Detected saved search without name in sync chunk, skipping it");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub fn collect_linked_notebooks_from_sync_chunk(chunk: &SyncChunk) -> Vec<LinkedNotebook> {
    let Some(linked_notebooks) = chunk.linked_notebooks.as_ref() else {
        return Vec::new();
    };

    linked_notebooks
        .iter()
        .filter(|linked_notebook| {
            if linked_notebook.guid.is_none() {
                warn!("Detected linked notebook without guid in sync chunk, skipping it");
                return false;
            }
            if linked_notebook.update_sequence_num.is_none() {
                warn!(
                    ?linked_notebook.guid,
                    "Detected linked notebook without USN in sync chunk, skipping it"
                );
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub fn collect_notes_from_sync_chunk(chunk: &SyncChunk) -> Vec<Note> {
    let Some(notes) = chunk.notes.as_ref() else {
        return Vec::new();
    };

    notes
        .iter()
        .filter(|note| {
            if note.guid.is_none() {
                warn!(?note.title, "Detected note without guid in sync chunk, skipping it");
                return false;
            }
            if note.update_sequence_num.is_none() {
                warn!(?note.guid, "Detected note without USN in sync chunk, skipping it");
                return false;
            }
            if note.notebook_guid.is_none() {
                warn!(?note.guid, "Detected note without notebook guid in sync chunk, skipping it");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub fn collect_resources_from_sync_chunk(chunk: &SyncChunk) -> Vec<Resource> {
    let Some(resources) = chunk.resources.as_ref() else {
        return Vec::new();
    };

    resources
        .iter()
        .filter(|resource| {
            if resource.guid.is_none() {
                warn!("Detected resource without guid in sync chunk, skipping it");
                return false;
            }
            if resource.update_sequence_num.is_none() {
                warn!(?resource.guid, "Detected resource without USN in sync chunk, skipping it");
                return false;
            }
            if resource.note_guid.is_none() {
                warn!(
                    ?resource.guid,
                    "Detected resource without note guid in sync chunk, skipping it"
                );
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub fn collect_expunged_note_guids_from_sync_chunk(chunk: &SyncChunk) -> Vec<Guid> {
    chunk.expunged_notes.clone().unwrap_or_default()
}

pub fn collect_expunged_notebook_guids_from_sync_chunk(chunk: &SyncChunk) -> Vec<Guid> {
    chunk.expunged_notebooks.clone().unwrap_or_default()
}

pub fn collect_expunged_tag_guids_from_sync_chunk(chunk: &SyncChunk) -> Vec<Guid> {
    chunk.expunged_tags.clone().unwrap_or_default()
}

pub fn collect_expunged_saved_search_guids_from_sync_chunk(chunk: &SyncChunk) -> Vec<Guid> {
    chunk.expunged_searches.clone().unwrap_or_default()
}

pub fn collect_expunged_linked_notebook_guids_from_sync_chunk(chunk: &SyncChunk) -> Vec<Guid> {
    chunk.expunged_linked_notebooks.clone().unwrap_or_default()
}
