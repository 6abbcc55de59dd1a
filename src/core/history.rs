//! Read access to the session records written by `end_job`.

use crate::core::error::HandoffError;
use crate::core::store::{EntryKind, KnowledgeStore};
use crate::core::workflow::SessionRecord;

const RECORD_PREFIX: &str = "session_";
const RECORD_SUFFIX: &str = ".json";

/// Root-relative path of the record for `session_id`.
pub fn record_path(history_dir: &str, session_id: &str) -> String {
    format!(
        "{}/{}{}{}",
        history_dir.trim_end_matches('/'),
        RECORD_PREFIX,
        session_id,
        RECORD_SUFFIX
    )
}

/// Session ids with a stored record, oldest first (ULIDs sort by time).
pub fn list_session_ids(store: &KnowledgeStore, history_dir: &str) -> Result<Vec<String>, HandoffError> {
    let entries = match store.list(history_dir) {
        Ok(entries) => entries,
        Err(HandoffError::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    Ok(entries
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .filter_map(|e| {
            e.name
                .strip_prefix(RECORD_PREFIX)
                .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
                .map(str::to_string)
        })
        .collect())
}

pub fn load_record(
    store: &KnowledgeStore,
    history_dir: &str,
    session_id: &str,
) -> Result<SessionRecord, HandoffError> {
    let raw = store.read(&record_path(history_dir, session_id))?;
    Ok(serde_json::from_str(&raw)?)
}
