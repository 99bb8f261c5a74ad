use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::errors::BookError;
use crate::wire::{GeneratedImage, ImageRequest, ModelRequest, Operation};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` for text and Imagen `predict` for covers.
pub struct GeminiProvider {
    client: Client,
    api_base: String,
    text_model: String,
    image_model: String,
    api_key_env: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_base", &self.api_base)
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("api_key_env", &self.api_key_env)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(cfg: &Config) -> Result<Self, BookError> {
        let mut builder = Client::builder();
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            BookError::Configuration(format!("HTTPクライアントを初期化できません: {e}"))
        })?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            text_model: cfg.text_model.clone(),
            image_model: cfg.image_model.clone(),
            api_key_env: cfg.api_key_env.clone(),
        })
    }

    fn api_key(&self) -> Result<String, BookError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(BookError::missing_credential(&self.api_key_env)),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{model}:{method}", self.api_base)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        op: Operation,
        url: &str,
        api_key: &str,
        body: &B,
    ) -> Result<String, BookError> {
        debug!(%op, url, "POST");
        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| BookError::request(op, e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| BookError::request(op, e.to_string()))?;
        debug!(%op, %status, bytes = text.len(), "response");

        if !status.is_success() {
            return Err(BookError::request(op, format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

fn request_body(req: &ModelRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        system_instruction: Content { role: None, parts: [Part { text: &req.prompt.instruction }] },
        contents: [Content { role: Some("user"), parts: [Part { text: &req.prompt.message }] }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: req.prompt.schema.to_gemini(),
            thinking_config: req
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        },
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Concatenated answer text of the first candidate, thought summaries excluded.
fn response_text(op: Operation, body: &str) -> Result<String, BookError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| BookError::response_format(op, format!("unreadable envelope: {e}")))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(BookError::response_format(op, "response contained no text"));
    }
    Ok(text)
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: [ImageInstance<'a>; 1],
    parameters: ImageParameters<'a>,
}

#[derive(Serialize)]
struct ImageInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageParameters<'a> {
    sample_count: u32,
    aspect_ratio: &'a str,
    output_options: OutputOptions<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions<'a> {
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[async_trait]
impl super::Provider for GeminiProvider {
    async fn generate(&self, req: &ModelRequest) -> Result<String, BookError> {
        let api_key = self.api_key()?;
        let url = self.endpoint(&self.text_model, "generateContent");
        let body = self.post(req.operation, &url, &api_key, &request_body(req)).await?;
        response_text(req.operation, &body)
    }

    async fn generate_image(&self, req: &ImageRequest) -> Result<GeneratedImage, BookError> {
        let op = Operation::GenerateImage;
        let api_key = self.api_key()?;
        let url = self.endpoint(&self.image_model, "predict");
        let body = PredictRequest {
            instances: [ImageInstance { prompt: &req.prompt }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: req.aspect_ratio,
                output_options: OutputOptions { mime_type: req.mime_type },
            },
        };

        let text = self.post(op, &url, &api_key, &body).await?;
        let parsed: PredictResponse = serde_json::from_str(&text)
            .map_err(|e| BookError::response_format(op, format!("unreadable envelope: {e}")))?;

        let prediction = parsed
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| BookError::response_format(op, "no image in response"))?;

        Ok(GeneratedImage {
            mime_type: prediction.mime_type.unwrap_or_else(|| req.mime_type.to_string()),
            data: prediction.bytes_base64_encoded.unwrap_or_default(),
        })
    }
}
