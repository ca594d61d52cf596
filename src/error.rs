//! 错误类型

use crate::models::ContentKind;
use thiserror::Error;
use uuid::Uuid;

/// 生成服务调用错误
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Document is empty")]
    EmptyDocument,

    #[error("Encoded document is {size} bytes, limit is {limit} bytes")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation service returned an error: {status}")]
    ServiceStatus { status: u16 },

    #[error("Generation service response has no '{field}' field")]
    MissingField { field: &'static str },

    #[error("Generation service returned empty {0} content")]
    EmptyContent(ContentKind),

    #[error("Invalid document encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Chat completion backend is not configured")]
    NotConfigured,

    #[error("Failed to save generated content: {0}")]
    Persist(String),
}

/// 学习会话状态机错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("'{action}' is not allowed while the session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Option {0} is not available for the current question")]
    UnknownOption(char),
}

/// 学习视图错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("Study view {0} is not open")]
    NotOpen(Uuid),

    #[error(transparent)]
    Session(#[from] SessionError),
}
