//! On-disk journal of per-item sync outcomes
//!
//! Layout of one scope directory (user-own notes shown; resources use the
//! same shape minus the expunge files, and linked notebooks get their own
//! subdirectories):
//!
//! ```text
//! <dir>/processedNotes.ini            guid=usn of fully processed notes
//! <dir>/cancelledNotes/<guid>.json    notes cancelled during last sync
//! <dir>/failedToDownloadNotes/<guid>.json
//! <dir>/failedToProcessNotes/<guid>.json
//! <dir>/expungedNotes.ini             guids of successfully expunged notes
//! <dir>/failedToExpungeNotes.ini
//! ```
//!
//! Ini files are flat `key=value` lines. All reads are tolerant of corrupt
//! files: bad entries are dropped with a warning, never an abort, because
//! the journal is an optimization, not the source of truth.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use eversync_core::domain::{Guid, Note, Resource, Usn};

pub const PROCESSED_NOTES_INI: &str = "processedNotes.ini";
pub const CANCELLED_NOTES_DIR: &str = "cancelledNotes";
pub const FAILED_TO_DOWNLOAD_NOTES_DIR: &str = "failedToDownloadNotes";
pub const FAILED_TO_PROCESS_NOTES_DIR: &str = "failedToProcessNotes";
pub const EXPUNGED_NOTES_INI: &str = "expungedNotes.ini";
pub const FAILED_TO_EXPUNGE_NOTES_INI: &str = "failedToExpungeNotes.ini";

pub const PROCESSED_RESOURCES_INI: &str = "processedResources.ini";
pub const CANCELLED_RESOURCES_DIR: &str = "cancelledResources";
pub const FAILED_TO_DOWNLOAD_RESOURCES_DIR: &str = "failedToDownloadResources";
pub const FAILED_TO_PROCESS_RESOURCES_DIR: &str = "failedToProcessResources";

/// Flat `key=value` file, read-modify-write on every mutation
///
/// The format matches what desktop settings frameworks produce for a
/// sectionless ini; keys are entity guids.
struct IniFile {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl IniFile {
    fn load(path: PathBuf) -> Self {
        let mut entries = BTreeMap::new();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('[') || line.starts_with(';') {
                        continue;
                    }
                    match line.split_once('=') {
                        Some((key, value)) => {
                            entries.insert(key.trim().to_owned(), value.trim().to_owned());
                        }
                        None => {
                            warn!(file = %path.display(), line, "Dropping malformed ini line");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read ini file");
            }
        }

        Self { path, entries }
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %e, "Failed to create dir for ini file");
                return;
            }
        }

        let mut contents = String::new();
        for (key, value) in &self.entries {
            contents.push_str(key);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }

        if let Err(e) = fs::write(&self.path, contents) {
            warn!(file = %self.path.display(), error = %e, "Failed to write ini file");
        }
    }
}

fn write_item<T: Serialize>(item: &T, guid: &Guid, dir: &Path, item_type: &str) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!(
            dir = %dir.display(),
            error = %e,
            "Cannot write {item_type} to file: failed to create dir"
        );
        return;
    }

    let path = dir.join(format!("{guid}.json"));
    let serialized = match serde_json::to_vec_pretty(item) {
        Ok(serialized) => serialized,
        Err(e) => {
            warn!(%guid, error = %e, "Cannot serialize {item_type} for journal");
            return;
        }
    };

    if let Err(e) = fs::write(&path, serialized) {
        warn!(file = %path.display(), error = %e, "Cannot write {item_type} to journal file");
    }
}

fn read_items<T: DeserializeOwned>(dir: &Path, item_type: &str) -> Vec<T> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut result = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read journal file with {item_type}");
                continue;
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(item) => result.push(item),
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Failed to deserialize {item_type} from journal file"
                );
            }
        }
    }

    result
}

fn remove_item_file(dir: &Path, guid: &Guid, description: &str) {
    let path = dir.join(format!("{guid}.json"));
    if path.exists() {
        if let Err(e) = fs::remove_file(&path) {
            warn!(file = %path.display(), error = %e, "Failed to remove journal file of {description}");
        }
    }
}

// Notes journal

/// Records a note as fully processed and clears any stale failure or
/// cancellation entries left for the same guid by previous runs
pub fn write_processed_note_info(note_guid: &Guid, usn: Usn, dir: &Path) {
    let mut processed = IniFile::load(dir.join(PROCESSED_NOTES_INI));
    processed.set(note_guid.as_str(), &usn.to_string());
    processed.save();

    remove_item_file(&dir.join(CANCELLED_NOTES_DIR), note_guid, "cancelled note");
    remove_item_file(
        &dir.join(FAILED_TO_DOWNLOAD_NOTES_DIR),
        note_guid,
        "note which failed to download",
    );
    remove_item_file(
        &dir.join(FAILED_TO_PROCESS_NOTES_DIR),
        note_guid,
        "note which failed to process",
    );

    let mut failed_to_expunge = IniFile::load(dir.join(FAILED_TO_EXPUNGE_NOTES_INI));
    failed_to_expunge.remove(note_guid.as_str());
    failed_to_expunge.save();
}

pub fn write_cancelled_note(note: &Note, dir: &Path) {
    if let Some(guid) = note.guid.as_ref() {
        write_item(note, guid, &dir.join(CANCELLED_NOTES_DIR), "note");
    }
}

pub fn write_failed_to_download_note(note: &Note, dir: &Path) {
    if let Some(guid) = note.guid.as_ref() {
        write_item(note, guid, &dir.join(FAILED_TO_DOWNLOAD_NOTES_DIR), "note");
    }
}

pub fn write_failed_to_process_note(note: &Note, dir: &Path) {
    if let Some(guid) = note.guid.as_ref() {
        write_item(note, guid, &dir.join(FAILED_TO_PROCESS_NOTES_DIR), "note");
    }
}

pub fn write_expunged_note(note_guid: &Guid, dir: &Path) {
    let mut expunged = IniFile::load(dir.join(EXPUNGED_NOTES_INI));
    expunged.set(note_guid.as_str(), "");
    expunged.save();

    let mut failed_to_expunge = IniFile::load(dir.join(FAILED_TO_EXPUNGE_NOTES_INI));
    failed_to_expunge.remove(note_guid.as_str());
    failed_to_expunge.save();
}

pub fn write_failed_to_expunge_note(note_guid: &Guid, dir: &Path) {
    let mut failed = IniFile::load(dir.join(FAILED_TO_EXPUNGE_NOTES_INI));
    failed.set(note_guid.as_str(), "");
    failed.save();
}

pub fn processed_notes_info_from_last_sync(dir: &Path) -> std::collections::HashMap<Guid, Usn> {
    let ini = IniFile::load(dir.join(PROCESSED_NOTES_INI));
    ini.entries
        .into_iter()
        .filter_map(|(guid, value)| match value.parse::<Usn>() {
            Ok(usn) => Some((Guid::new(guid), usn)),
            Err(_) => {
                warn!(guid, value, "Detected non-integer processed note USN value");
                None
            }
        })
        .collect()
}

pub fn notes_which_failed_to_download_during_last_sync(dir: &Path) -> Vec<Note> {
    read_items(&dir.join(FAILED_TO_DOWNLOAD_NOTES_DIR), "note")
}

pub fn notes_which_failed_to_process_during_last_sync(dir: &Path) -> Vec<Note> {
    read_items(&dir.join(FAILED_TO_PROCESS_NOTES_DIR), "note")
}

pub fn notes_cancelled_during_last_sync(dir: &Path) -> Vec<Note> {
    read_items(&dir.join(CANCELLED_NOTES_DIR), "note")
}

pub fn note_guids_expunged_during_last_sync(dir: &Path) -> Vec<Guid> {
    IniFile::load(dir.join(EXPUNGED_NOTES_INI))
        .entries
        .into_keys()
        .map(Guid::new)
        .collect()
}

pub fn note_guids_which_failed_to_expunge_during_last_sync(dir: &Path) -> Vec<Guid> {
    IniFile::load(dir.join(FAILED_TO_EXPUNGE_NOTES_INI))
        .entries
        .into_keys()
        .map(Guid::new)
        .collect()
}

// Resources journal

pub fn write_processed_resource_info(resource_guid: &Guid, usn: Usn, dir: &Path) {
    let mut processed = IniFile::load(dir.join(PROCESSED_RESOURCES_INI));
    processed.set(resource_guid.as_str(), &usn.to_string());
    processed.save();

    remove_item_file(
        &dir.join(CANCELLED_RESOURCES_DIR),
        resource_guid,
        "cancelled resource",
    );
    remove_item_file(
        &dir.join(FAILED_TO_DOWNLOAD_RESOURCES_DIR),
        resource_guid,
        "resource which failed to download",
    );
    remove_item_file(
        &dir.join(FAILED_TO_PROCESS_RESOURCES_DIR),
        resource_guid,
        "resource which failed to process",
    );
}

pub fn write_cancelled_resource(resource: &Resource, dir: &Path) {
    if let Some(guid) = resource.guid.as_ref() {
        write_item(resource, guid, &dir.join(CANCELLED_RESOURCES_DIR), "resource");
    }
}

pub fn write_failed_to_download_resource(resource: &Resource, dir: &Path) {
    if let Some(guid) = resource.guid.as_ref() {
        write_item(
            resource,
            guid,
            &dir.join(FAILED_TO_DOWNLOAD_RESOURCES_DIR),
            "resource",
        );
    }
}

pub fn write_failed_to_process_resource(resource: &Resource, dir: &Path) {
    if let Some(guid) = resource.guid.as_ref() {
        write_item(
            resource,
            guid,
            &dir.join(FAILED_TO_PROCESS_RESOURCES_DIR),
            "resource",
        );
    }
}

pub fn processed_resources_info_from_last_sync(dir: &Path) -> std::collections::HashMap<Guid, Usn> {
    let ini = IniFile::load(dir.join(PROCESSED_RESOURCES_INI));
    ini.entries
        .into_iter()
        .filter_map(|(guid, value)| match value.parse::<Usn>() {
            Ok(usn) => Some((Guid::new(guid), usn)),
            Err(_) => {
                warn!(guid, value, "Detected non-integer processed resource USN value");
                None
            }
        })
        .collect()
}

pub fn resources_which_failed_to_download_during_last_sync(dir: &Path) -> Vec<Resource> {
    read_items(&dir.join(FAILED_TO_DOWNLOAD_RESOURCES_DIR), "resource")
}

pub fn resources_which_failed_to_process_during_last_sync(dir: &Path) -> Vec<Resource> {
    read_items(&dir.join(FAILED_TO_PROCESS_RESOURCES_DIR), "resource")
}

pub fn resources_cancelled_during_last_sync(dir: &Path) -> Vec<Resource> {
    read_items(&dir.join(CANCELLED_RESOURCES_DIR), "resource")
}
