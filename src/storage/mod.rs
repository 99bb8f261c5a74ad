use std::path::PathBuf;

use fs_err as fs;
use tracing::warn;

use crate::errors::BookError;
use crate::wire::SavedChapter;

pub const SAVED_CHAPTERS_KEY: &str = "savedBookChapters";

/// String values under fixed keys; a stand-in for browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, BookError>;
    fn set(&self, key: &str, value: &str) -> Result<(), BookError>;
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, BookError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BookError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Saved chapters as one JSON array under [`SAVED_CHAPTERS_KEY`].
pub struct SavedChapterStore {
    kv: Box<dyn KeyValueStore>,
}

impl SavedChapterStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FileStore::new(dir)))
    }

    /// Unreadable or malformed data is logged and treated as empty.
    pub fn load(&self) -> Vec<SavedChapter> {
        let raw = match self.kv.get(SAVED_CHAPTERS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "could not read saved chapters");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(chapters) => chapters,
            Err(e) => {
                warn!(error = %e, "failed to parse saved chapters; starting empty");
                Vec::new()
            }
        }
    }

    pub fn save(&self, chapters: &[SavedChapter]) -> Result<(), BookError> {
        let encoded = serde_json::to_string(chapters)
            .map_err(|e| BookError::Io(std::io::Error::other(e)))?;
        self.kv.set(SAVED_CHAPTERS_KEY, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ChapterId, Section};

    fn saved(id: &str, title: &str) -> SavedChapter {
        SavedChapter {
            id: ChapterId::new(id),
            title: title.into(),
            overview: "概要".into(),
            purpose: "目的".into(),
            sections: vec![Section { title: "節".into(), summary: "要約".into() }],
            content: "本文".into(),
            intent: "意図".into(),
        }
    }

    #[test]
    fn round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SavedChapterStore::in_dir(dir.path());
        let chapters = vec![saved("2-1", "旗"), saved("1-0", "問い")];

        store.save(&chapters).unwrap();
        assert_eq!(store.load(), chapters);
        assert!(dir.path().join("savedBookChapters.json").exists());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SavedChapterStore::in_dir(dir.path().join("nested")).load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("savedBookChapters.json"), "{not json").unwrap();
        assert!(SavedChapterStore::in_dir(dir.path()).load().is_empty());
    }

    #[test]
    fn reads_payload_written_by_the_browser_app() {
        let dir = tempfile::tempdir().unwrap();
        let payload = r#"[{"id":"1718000000000-0","title":"問い","overview":"o","purpose":"p","sections":[{"title":"s","summary":"m"}],"content":"c","intent":"i"}]"#;
        FileStore::new(dir.path()).set(SAVED_CHAPTERS_KEY, payload).unwrap();

        let loaded = SavedChapterStore::in_dir(dir.path()).load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_str(), "1718000000000-0");
        assert_eq!(loaded[0].sections[0].summary, "m");
    }
}
