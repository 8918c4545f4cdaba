//! Local history of completed sessions
//!
//! Stored as one JSON document, newest session first. Loading never fails:
//! a missing or unreadable file is an empty history.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Session;
use crate::error::Result;
use crate::images::SessionStamp;

/// Most sessions kept; inserting beyond this evicts the oldest
pub const HISTORY_CAPACITY: usize = 20;

/// Capped, newest-first collection of sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    sessions: Vec<Session>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session at the front, returning the evicted one if the cap was hit
    ///
    /// A session with the same id is replaced.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.retain(|s| s.id != session.id);
        self.sessions.insert(0, session);
        if self.sessions.len() > HISTORY_CAPACITY {
            self.sessions.pop()
        } else {
            None
        }
    }

    pub fn remove(&mut self, id: SessionStamp) -> Option<Session> {
        let pos = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(pos))
    }

    pub fn get(&self, id: SessionStamp) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn latest(&self) -> Option<&Session> {
        self.sessions.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Read history from `path`
    pub async fn load(path: &Path) -> History {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return History::new(),
            Err(e) => {
                warn!("Cannot read history {:?}, starting empty: {}", path, e);
                return History::new();
            }
        };

        match serde_json::from_slice::<History>(&bytes) {
            Ok(mut history) => {
                history.sessions.truncate(HISTORY_CAPACITY);
                debug!("Loaded {} sessions from {:?}", history.len(), path);
                history
            }
            Err(e) => {
                warn!("History {:?} is corrupt, starting empty: {}", path, e);
                History::new()
            }
        }
    }

    /// Write history to `path` through a temporary file and rename
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        let tmp_path = temp_path(path);
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        debug!("Saved {} sessions to {:?}", self.len(), path);
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history.json".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::images::ImageRef;
    use chrono::Utc;

    fn session(id: i64) -> Session {
        Session {
            id: SessionStamp::from_millis(id),
            original_image: format!("photo-{}.jpg", id),
            final_image: ImageRef::from_url(&format!("improved-{}.png", id)),
            analysis: Analysis::fallback("needs work"),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_is_newest_first_and_capped() {
        let mut history = History::new();
        for id in 1..=HISTORY_CAPACITY as i64 {
            assert!(history.insert(session(id)).is_none());
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);

        // The 21st insert evicts the oldest
        let evicted = history.insert(session(21)).unwrap();
        assert_eq!(evicted.id, SessionStamp::from_millis(1));
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.latest().unwrap().id, SessionStamp::from_millis(21));
        assert!(history.get(SessionStamp::from_millis(1)).is_none());
    }

    #[test]
    fn test_get_does_not_reorder() {
        let mut history = History::new();
        history.insert(session(1));
        history.insert(session(2));
        assert!(history.get(SessionStamp::from_millis(1)).is_some());
        assert_eq!(history.latest().unwrap().id, SessionStamp::from_millis(2));
    }

    #[test]
    fn test_remove() {
        let mut history = History::new();
        history.insert(session(1));
        history.insert(session(2));
        assert!(history.remove(SessionStamp::from_millis(1)).is_some());
        assert!(history.remove(SessionStamp::from_millis(1)).is_none());
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let mut history = History::new();
        history.insert(session(1));
        history.insert(session(2));
        history.save(&path).await.unwrap();

        let loaded = History::load(&path).await;
        assert_eq!(loaded, history);
        assert!(!dir.path().join("nested").join(".history.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(History::load(&dir.path().join("absent.json")).await.is_empty());

        let path = dir.path().join("history.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(History::load(&path).await.is_empty());
    }
}
