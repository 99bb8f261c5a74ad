//! Typed model operations: build the prompt, call the provider once, and
//! turn the raw text into the shape the operation promises.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::BookError;
use crate::log::ArtifactLog;
use crate::prompt::{self, PERSONA};
use crate::provider::DynProvider;
use crate::schema::Schema;
use crate::wire::{
    ChapterWriteParams, ImageRequest, ImageTone, ModelRequest, Operation, OutlineDraft,
    OutlineParams, Prompt, ReviewChapter, ReviewResult, WrittenChapterContent,
};

#[derive(Clone)]
pub struct Gateway {
    provider: DynProvider,
    thinking_budget: u32,
    artifacts: Option<Arc<ArtifactLog>>,
}

impl Gateway {
    pub fn new(provider: DynProvider, thinking_budget: u32) -> Self {
        Self { provider, thinking_budget, artifacts: None }
    }

    pub fn with_artifacts(mut self, log: ArtifactLog) -> Self {
        self.artifacts = Some(Arc::new(log));
        self
    }

    pub async fn generate_outline(
        &self,
        params: &OutlineParams,
    ) -> Result<Vec<OutlineDraft>, BookError> {
        let op = Operation::GenerateOutline;
        let prompt = prompt::build_outline_prompt(params, PERSONA)?;
        let drafts: Vec<OutlineDraft> = self.call(op, prompt, params.thinking).await?;
        if drafts.is_empty() {
            return Err(BookError::response_format(op, "empty outline"));
        }
        Ok(drafts)
    }

    pub async fn adjust_outline(
        &self,
        current: &OutlineDraft,
        instruction: &str,
    ) -> Result<OutlineDraft, BookError> {
        let prompt = prompt::build_outline_adjustment_prompt(current, instruction, PERSONA)?;
        self.call(Operation::AdjustOutline, prompt, true).await
    }

    pub async fn write_chapter(
        &self,
        params: &ChapterWriteParams,
    ) -> Result<WrittenChapterContent, BookError> {
        let prompt = prompt::build_chapter_write_prompt(params, PERSONA)?;
        self.call(Operation::WriteChapter, prompt, params.thinking).await
    }

    pub async fn adjust_chapter(
        &self,
        original: &WrittenChapterContent,
        instruction: &str,
    ) -> Result<WrittenChapterContent, BookError> {
        let prompt = prompt::build_chapter_adjustment_prompt(original, instruction, PERSONA)?;
        self.call(Operation::AdjustChapter, prompt, true).await
    }

    pub async fn final_review(
        &self,
        chapters: &[ReviewChapter],
    ) -> Result<Vec<ReviewChapter>, BookError> {
        let prompt = prompt::build_final_review_prompt(chapters, PERSONA)?;
        let result: ReviewResult = self.call(Operation::FinalReview, prompt, true).await?;
        Ok(result.chapters)
    }

    /// One 16:9 cover, returned as a `data:` URI.
    pub async fn generate_image(
        &self,
        content: &str,
        tone: ImageTone,
    ) -> Result<String, BookError> {
        let req = ImageRequest {
            prompt: prompt::build_image_prompt(content, tone)?,
            aspect_ratio: "16:9",
            mime_type: "image/jpeg",
        };
        info!(op = %Operation::GenerateImage, ?tone, "model request");
        let image = self.provider.generate_image(&req).await?;
        if image.data.is_empty() {
            return Err(BookError::response_format(Operation::GenerateImage, "empty image data"));
        }
        Ok(image.data_uri())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: Operation,
        prompt: Prompt,
        thinking: bool,
    ) -> Result<T, BookError> {
        let req = ModelRequest {
            operation,
            prompt,
            thinking_budget: thinking.then_some(self.thinking_budget),
        };
        info!(op = %operation, thinking = req.thinking_budget.is_some(), "model request");

        let raw = self.provider.generate(&req).await?;
        if let Some(log) = &self.artifacts {
            if let Err(e) = log.save_exchange(&req, &raw) {
                warn!(op = %operation, error = %e, "could not record artifacts");
            }
        }
        decode(operation, &req.prompt.schema, &raw)
    }
}

/// Trim, parse, check against `schema`, then deserialize.
pub fn decode<T: DeserializeOwned>(
    op: Operation,
    schema: &Schema,
    raw: &str,
) -> Result<T, BookError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| BookError::response_format(op, format!("invalid JSON: {e}")))?;
    schema
        .validate(&value)
        .map_err(|detail| BookError::response_format(op, detail))?;
    serde_json::from_value(value).map_err(|e| BookError::response_format(op, e.to_string()))
}
