use thiserror::Error;

use crate::wire::Operation;

#[derive(Error, Debug)]
pub enum BookError {
    /// Missing credential or unusable configuration. Message is user-facing.
    #[error("{0}")]
    Configuration(String),

    /// Blank or out-of-range input. Message is user-facing.
    #[error("{0}")]
    InvalidParameter(String),

    #[error("{op}: malformed model response: {detail}")]
    ResponseFormat { op: Operation, detail: String },

    #[error("{op}: request failed: {detail}")]
    Request { op: Operation, detail: String },

    /// Operation requested before its inputs exist. Message is user-facing.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BookError {
    pub fn missing_credential(env: &str) -> Self {
        BookError::Configuration(format!("{env}が設定されていません。"))
    }

    pub fn response_format(op: Operation, detail: impl Into<String>) -> Self {
        BookError::ResponseFormat { op, detail: detail.into() }
    }

    pub fn request(op: Operation, detail: impl Into<String>) -> Self {
        BookError::Request { op, detail: detail.into() }
    }

    /// Text for the draft's error slot. Response and transport failures
    /// collapse into one generic message per operation.
    pub fn user_message(&self) -> String {
        match self {
            BookError::Configuration(msg)
            | BookError::InvalidParameter(msg)
            | BookError::Precondition(msg) => msg.clone(),
            BookError::ResponseFormat { op, .. } | BookError::Request { op, .. } => {
                op.failure_message().to_string()
            }
            BookError::Io(e) => format!("保存に失敗しました: {e}"),
        }
    }
}
