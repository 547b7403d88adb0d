use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::checklist::{type_from_display_name, DEFAULT_TYPE};
use crate::session_key::validate_session_key;
use crate::state::StateDocument;
use crate::status::RowStatus;

pub const DOCUMENT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid session key: {0}")]
    InvalidKey(String),
    #[error("Session store IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to (de)serialize session: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default = "document_version")]
    pub version: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn document_version() -> String {
    DOCUMENT_VERSION.to_string()
}

impl SessionMetadata {
    pub fn new(created: i64) -> Self {
        Self {
            version: document_version(),
            created,
            last_modified: None,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub session_key: String,
    pub type_slug: String,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub state: StateDocument,
}

/// Incoming save payload. Anything outside these fields is dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionWrite {
    pub type_slug: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub state: StateDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_key: String,
    pub type_slug: String,
    pub created: i64,
    pub last_modified: Option<i64>,
    /// File modification time in ms since the epoch.
    pub modified_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub status_buttons: BTreeMap<String, RowStatus>,
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if !validate_session_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.session_path(key)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Writes a placeholder document unless the session already has content.
    pub fn create(&self, key: &str, type_slug: &str) -> Result<SessionDocument, StoreError> {
        let path = self.session_path(key)?;
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.lock_exclusive()?;
        let result = (|| -> Result<SessionDocument, StoreError> {
            if file.metadata()?.len() > 0 {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }
            let document = SessionDocument {
                session_key: key.to_string(),
                type_slug: type_slug.to_string(),
                metadata: SessionMetadata::new(now_ms()),
                state: StateDocument::default(),
            };
            rewrite_locked(&mut file, &serde_json::to_value(&document)?)?;
            Ok(document)
        })();
        let _ = FileExt::unlock(&file);
        result
    }

    pub fn read(&self, key: &str) -> Result<SessionDocument, StoreError> {
        let path = self.session_path(key)?;
        let value = read_locked(&path)?.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        decode_document(key, value)
    }

    /// Replaces the stored document. Existing metadata fields the incoming
    /// payload does not mention survive; `lastModified` is always stamped.
    pub fn write(&self, key: &str, incoming: &SessionWrite) -> Result<SessionDocument, StoreError> {
        let path = self.session_path(key)?;
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.lock_exclusive()?;
        let result = (|| -> Result<SessionDocument, StoreError> {
            let existing = read_value(&mut file)?;
            let mut metadata = existing
                .as_ref()
                .and_then(|value| value.get("metadata"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            if let Some(fields) = &incoming.metadata {
                for (name, value) in fields {
                    metadata.insert(name.clone(), value.clone());
                }
            }
            let now = now_ms();
            metadata
                .entry("version".to_string())
                .or_insert_with(|| Value::from(DOCUMENT_VERSION));
            metadata
                .entry("created".to_string())
                .or_insert_with(|| Value::from(now));
            metadata.insert("lastModified".to_string(), Value::from(now));

            let document = SessionDocument {
                session_key: key.to_string(),
                type_slug: incoming.type_slug.clone(),
                metadata: serde_json::from_value(Value::Object(metadata))?,
                state: incoming.state.clone(),
            };
            rewrite_locked(&mut file, &serde_json::to_value(&document)?)?;
            Ok(document)
        })();
        let _ = FileExt::unlock(&file);
        result
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.session_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Every decodable session, newest file first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        Ok(self
            .list_detailed()?
            .into_iter()
            .map(|detail| detail.summary)
            .collect())
    }

    pub fn list_detailed(&self) -> Result<Vec<SessionDetail>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !validate_session_key(key) {
                continue;
            }
            let value = match read_locked(&path) {
                Ok(Some(value)) => value,
                _ => continue,
            };
            let Ok(document) = decode_document(key, value) else {
                continue;
            };
            let modified_at = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_millis() as i64)
                .unwrap_or(0);
            sessions.push(SessionDetail {
                summary: SessionSummary {
                    session_key: document.session_key,
                    type_slug: document.type_slug,
                    created: document.metadata.created,
                    last_modified: document.metadata.last_modified,
                    modified_at,
                },
                status_buttons: document.state.status_buttons,
            });
        }
        sessions.sort_by(|a, b| {
            b.summary
                .modified_at
                .cmp(&a.summary.modified_at)
                .then_with(|| a.summary.session_key.cmp(&b.summary.session_key))
        });
        Ok(sessions)
    }
}

/// Decodes a stored document, filling in what legacy files lack:
/// the type slug falls back to the legacy display name, then the default type.
pub fn decode_document(key: &str, mut value: Value) -> Result<SessionDocument, StoreError> {
    let Some(object) = value.as_object_mut() else {
        return Err(StoreError::Serde(serde::de::Error::custom(
            "session document is not an object",
        )));
    };
    let explicit = object
        .get("typeSlug")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
        .map(str::to_string);
    let type_slug = explicit
        .or_else(|| {
            ["typeName", "type"]
                .iter()
                .filter_map(|field| object.get(*field).and_then(Value::as_str))
                .find_map(type_from_display_name)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_TYPE.to_string());
    object.insert("typeSlug".to_string(), Value::from(type_slug));
    object
        .entry("sessionKey".to_string())
        .or_insert_with(|| Value::from(key));
    object
        .entry("metadata".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    Ok(serde_json::from_value(value)?)
}

fn read_locked(path: &Path) -> Result<Option<Value>, StoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::Io(err)),
    };
    file.lock_shared()?;
    let result = read_value(&mut file);
    let _ = FileExt::unlock(&file);
    result
}

fn read_value(file: &mut File) -> Result<Option<Value>, StoreError> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&contents)?))
}

fn rewrite_locked(file: &mut File, value: &Value) -> Result<(), StoreError> {
    let body = serde_json::to_string_pretty(value)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{StatusFlag, TaskStatus};
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = SessionStore::open(temp.path().join("sessions")).expect("store");
        (temp, store)
    }

    #[test]
    fn create_is_first_write_wins() {
        let (_temp, store) = store();
        let first = store.create("ABC", "word").expect("create");
        let err = store.create("ABC", "excel").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        let stored = store.read("ABC").expect("read");
        assert_eq!(stored.type_slug, "word");
        assert_eq!(stored.metadata.created, first.metadata.created);
        assert_eq!(stored.metadata.last_modified, None);
    }

    #[test]
    fn write_preserves_unmentioned_metadata_and_stamps_last_modified() {
        let (_temp, store) = store();
        let created = store.create("ABC", "word").expect("create");
        let mut state = StateDocument::default();
        state
            .notes
            .insert("textarea-1.1".to_string(), "looks good".to_string());
        state.status_buttons.insert(
            "status-1.1".to_string(),
            RowStatus::new(TaskStatus::Done, StatusFlag::ActiveManual),
        );
        let mut metadata = Map::new();
        metadata.insert("reviewer".to_string(), Value::from("kim"));
        store
            .write(
                "ABC",
                &SessionWrite {
                    type_slug: "word".to_string(),
                    metadata: Some(metadata),
                    state,
                },
            )
            .expect("write");

        let stored = store.read("ABC").expect("read");
        assert_eq!(stored.metadata.created, created.metadata.created);
        assert!(stored.metadata.last_modified.is_some());
        assert_eq!(stored.metadata.extra.get("reviewer"), Some(&Value::from("kim")));
        assert_eq!(stored.state.notes["textarea-1.1"], "looks good");
    }

    #[test]
    fn write_replaces_state_wholesale() {
        let (_temp, store) = store();
        let mut first = SessionWrite {
            type_slug: "word".to_string(),
            ..SessionWrite::default()
        };
        first
            .state
            .notes
            .insert("textarea-1.1".to_string(), "a".to_string());
        store.write("ABC", &first).expect("first");
        let mut second = SessionWrite {
            type_slug: "word".to_string(),
            ..SessionWrite::default()
        };
        second
            .state
            .notes
            .insert("textarea-1.2".to_string(), "b".to_string());
        store.write("ABC", &second).expect("second");
        let stored = store.read("ABC").expect("read");
        assert!(!stored.state.notes.contains_key("textarea-1.1"));
        assert_eq!(stored.state.notes["textarea-1.2"], "b");
    }

    #[test]
    fn delete_missing_session_is_not_found() {
        let (_temp, store) = store();
        assert!(matches!(store.delete("XYZ"), Err(StoreError::NotFound(_))));
        store.create("XYZ", "word").expect("create");
        store.delete("XYZ").expect("delete");
        assert!(!store.exists("XYZ"));
        assert!(matches!(store.read("XYZ"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn rejects_path_like_keys() {
        let (_temp, store) = store();
        assert!(matches!(
            store.read("../etc"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn list_fills_legacy_type_slug() {
        let (_temp, store) = store();
        fs::write(
            store.dir().join("OLD.json"),
            r#"{"sessionKey":"OLD","typeName":"PowerPoint","metadata":{"created":1},"state":{}}"#,
        )
        .expect("legacy");
        fs::write(store.dir().join("BAR.json"), r#"{"state":{}}"#).expect("bare");
        fs::write(store.dir().join("BAD.json"), "not json").expect("bad");
        let sessions = store.list().expect("list");
        let slug = |key: &str| {
            sessions
                .iter()
                .find(|s| s.session_key == key)
                .map(|s| s.type_slug.clone())
        };
        assert_eq!(sessions.len(), 2);
        assert_eq!(slug("OLD").as_deref(), Some("powerpoint"));
        assert_eq!(slug("BAR").as_deref(), Some(DEFAULT_TYPE));
    }

    #[test]
    fn list_is_newest_first() {
        let (_temp, store) = store();
        store.create("AAA", "word").expect("a");
        std::thread::sleep(std::time::Duration::from_millis(20));
        store.create("BBB", "word").expect("b");
        let keys: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|s| s.session_key)
            .collect();
        assert_eq!(keys, vec!["BBB".to_string(), "AAA".to_string()]);
    }
}
