//! Persisted synchronization state

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::newtypes::{Guid, Usn};

/// The per-account sync watermark persisted between runs
///
/// `user_data_update_count` is the largest user-own USN the engine has
/// fully applied; each linked notebook keeps its own counter since linked
/// notebooks own independent USN spaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub user_data_update_count: Usn,
    /// Msec since epoch of the last completed user-own sync
    #[serde(default)]
    pub user_data_last_sync_time: i64,
    #[serde(default)]
    pub linked_notebook_update_counts: HashMap<Guid, Usn>,
    #[serde(default)]
    pub linked_notebook_last_sync_times: HashMap<Guid, i64>,
}
