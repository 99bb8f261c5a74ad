use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::errors::BookError;
use crate::wire::{GeneratedImage, ImageRequest, ModelRequest};

pub mod gemini;

/// Hosted model backend. Implementations resolve credentials per call.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the raw text of the model's structured response.
    async fn generate(&self, req: &ModelRequest) -> Result<String, BookError>;

    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, BookError>;
}

pub type DynProvider = Arc<dyn Provider>;

pub fn make_provider(cfg: &Config) -> Result<DynProvider, BookError> {
    Ok(Arc::new(gemini::GeminiProvider::new(cfg)?))
}
