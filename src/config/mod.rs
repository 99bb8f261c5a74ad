use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::errors::BookError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    /// Environment variable holding the API key. Read on every call.
    pub api_key_env: String,
    pub thinking_budget: u32,
    /// Attach the thinking budget to outline generation and chapter writing.
    pub thinking_mode: bool,
    /// No timeout when unset.
    pub timeout_secs: Option<u64>,
    pub data_dir: String,
    pub save_artifacts: bool,
    pub max_parallel_writes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".into(),
            text_model: "gemini-2.5-pro".into(),
            image_model: "imagen-4.0-generate-001".into(),
            api_key_env: "API_KEY".into(),
            thinking_budget: 32768,
            thinking_mode: true,
            timeout_secs: None,
            data_dir: ".book_drafter".into(),
            save_artifacts: false,
            max_parallel_writes: 3,
        }
    }
}

impl Config {
    /// Defaults, overlaid with the TOML file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, BookError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| {
            BookError::Configuration(format!("設定ファイル {} を読み込めません: {e}", path.display()))
        })
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}
