use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use fs_err as fs;
use serde_json::{json, to_string_pretty};
use tracing::debug;
use uuid::Uuid;

use crate::errors::BookError;
use crate::wire::ModelRequest;

/// Records every model exchange of one session under
/// `<root>/artifacts/<session>/`.
#[derive(Debug)]
pub struct ArtifactLog {
    dir: PathBuf,
    seq: AtomicUsize,
}

pub struct SavedPaths {
    pub request: PathBuf,
    pub response: PathBuf,
}

impl ArtifactLog {
    pub fn new(root: &Path, session: Uuid) -> Self {
        Self {
            dir: root.join("artifacts").join(session.to_string()),
            seq: AtomicUsize::new(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_exchange(&self, req: &ModelRequest, raw: &str) -> Result<SavedPaths, BookError> {
        fs::create_dir_all(&self.dir)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let stem = format!("{seq:03}-{}", req.operation);

        let request = json!({
            "operation": req.operation,
            "recorded_at": Utc::now(),
            "system_instruction": req.prompt.instruction,
            "message": req.prompt.message,
            "response_schema": req.prompt.schema.to_gemini(),
            "thinking_budget": req.thinking_budget,
        });
        let request_path = self.dir.join(format!("{stem}.request.json"));
        let encoded = to_string_pretty(&request)
            .map_err(|e| BookError::Io(std::io::Error::other(e)))?;
        fs::write(&request_path, encoded)?;

        let response_path = self.dir.join(format!("{stem}.response.txt"));
        fs::write(&response_path, raw)?;

        debug!(request = %request_path.display(), response = %response_path.display(), "artifacts saved");
        Ok(SavedPaths { request: request_path, response: response_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::wire::{Operation, Prompt};

    #[test]
    fn exchanges_are_numbered_per_session() {
        let root = tempfile::tempdir().unwrap();
        let log = ArtifactLog::new(root.path(), Uuid::new_v4());
        let req = ModelRequest {
            operation: Operation::FinalReview,
            prompt: Prompt {
                instruction: "sys".into(),
                message: "msg".into(),
                schema: Schema::of::<String>(),
            },
            thinking_budget: Some(32768),
        };

        let first = log.save_exchange(&req, "{\"chapters\":[]}").unwrap();
        let second = log.save_exchange(&req, "raw").unwrap();

        assert!(first.request.ends_with("001-final_review.request.json"));
        assert!(second.response.ends_with("002-final_review.response.txt"));

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first.request).unwrap()).unwrap();
        assert_eq!(saved["operation"], "final_review");
        assert_eq!(saved["thinking_budget"], 32768);
        assert_eq!(std::fs::read_to_string(&second.response).unwrap(), "raw");
    }
}
