//! In-memory provider for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::BookError;
use crate::provider::Provider;
use crate::wire::{GeneratedImage, ImageRequest, ModelRequest, Operation};

/// Replays queued responses in order and records what it was asked.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, BookError>>>,
    images: Mutex<VecDeque<Result<GeneratedImage, BookError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    image_prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_text(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_json<T: Serialize>(&self, value: &T) {
        self.push_text(&serde_json::to_string(value).unwrap());
    }

    pub fn push_err(&self, err: BookError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn push_image(&self, mime_type: &str, data: &str) {
        self.images.lock().unwrap().push_back(Ok(GeneratedImage {
            mime_type: mime_type.into(),
            data: data.into(),
        }));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn image_prompts(&self) -> Vec<String> {
        self.image_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, req: &ModelRequest) -> Result<String, BookError> {
        self.requests.lock().unwrap().push(req.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BookError::request(req.operation, "no scripted reply")))
    }

    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, BookError> {
        self.image_prompts.lock().unwrap().push(req.prompt.clone());
        self.images
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BookError::request(Operation::GenerateImage, "no scripted image")))
    }
}
