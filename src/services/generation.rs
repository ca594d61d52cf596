//! 内容生成服务模块
//! 远程生成接口客户端、OpenAI 兼容的聊天补全后端以及提示词工程

use crate::error::GenerationError;
use crate::models::ContentKind;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// 生成服务：输入 base64 编码的文档，返回对应类型的文本
pub trait GenerationService: Send + Sync + 'static {
    fn generate(
        &self,
        kind: ContentKind,
        encoded_document: String,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// 将文档编码为传输格式
pub fn encode_document(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// 生成接口请求体
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequestBody {
    pub file_content: String,
}

/// 调用远程生成接口（`POST {base}/api/{endpoint}`）
#[derive(Clone)]
pub struct RemoteGenerator {
    base_url: String,
    http_client: reqwest::Client,
}

impl RemoteGenerator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn endpoint_url(&self, kind: ContentKind) -> String {
        format!("{}/api/{}", self.base_url, kind.endpoint())
    }
}

impl GenerationService for RemoteGenerator {
    async fn generate(
        &self,
        kind: ContentKind,
        encoded_document: String,
    ) -> Result<String, GenerationError> {
        let url = self.endpoint_url(kind);
        log::debug!(
            "requesting {} from {} ({:.2} MB encoded)",
            kind,
            url,
            encoded_document.len() as f64 / (1024.0 * 1024.0)
        );

        let response = self
            .http_client
            .post(&url)
            .json(&GenerationRequestBody {
                file_content: encoded_document,
            })
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(GenerationError::ServiceStatus {
                status: response.status().as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        extract_field(&body, kind)
    }
}

/// 从响应中取出对应类型的字段
pub fn extract_field(body: &serde_json::Value, kind: ContentKind) -> Result<String, GenerationError> {
    let field = kind.response_field();
    let text = body
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or(GenerationError::MissingField { field })?;

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyContent(kind));
    }
    Ok(text.to_string())
}

/// 聊天补全后端配置
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1500,
            temperature: 0.7,
        }
    }
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// 生成接口的服务端实现：解码文档并调用聊天补全
#[derive(Clone)]
pub struct ChatCompletionGenerator {
    config: ChatConfig,
    http_client: reqwest::Client,
}

impl ChatCompletionGenerator {
    pub fn new(config: ChatConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// 聊天补全
    pub async fn chat_complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GenerationError::NotConfigured)?;
        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::ServiceStatus {
                status: response.status().as_u16(),
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default())
    }
}

impl GenerationService for ChatCompletionGenerator {
    async fn generate(
        &self,
        kind: ContentKind,
        encoded_document: String,
    ) -> Result<String, GenerationError> {
        let text = decode_document_text(&encoded_document)?;
        log::info!(
            "generating {} from {} characters of document text",
            kind,
            text.chars().count()
        );

        let content = self
            .chat_complete(vec![
                ChatMessage::new("system", GenerationPrompt::system(kind).to_string()),
                ChatMessage::new("user", GenerationPrompt::user(kind, &text)),
            ])
            .await?;

        if content.is_empty() {
            return Err(GenerationError::EmptyContent(kind));
        }
        Ok(content)
    }
}

/// 解码 base64 文档为文本（非 UTF-8 字节按替换字符处理）
pub fn decode_document_text(encoded: &str) -> Result<String, GenerationError> {
    let bytes = BASE64.decode(encoded.trim())?;
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    if text.is_empty() {
        return Err(GenerationError::EmptyDocument);
    }
    Ok(text)
}

/// 生成提示词
pub struct GenerationPrompt;

impl GenerationPrompt {
    pub fn system(kind: ContentKind) -> &'static str {
        match kind {
            ContentKind::Test => "You are an expert study guide and practice test generator.",
            ContentKind::Flashcard => "You are an expert flashcard generator.",
            ContentKind::CribSheet => "You are an expert crib sheet generator.",
        }
    }

    pub fn user(kind: ContentKind, document_text: &str) -> String {
        match kind {
            ContentKind::Test => format!(
                r#"Generate a multiple-choice practice test based on the following content.

## Output format:
Each question is a block. Separate blocks with a line containing only ---
Each block looks exactly like this:

1. <question>
A) <option>
B) <option>
C) <option>
D) <option>
Correct answer: <letter>

Number the questions 1, 2, 3 and so on. Output only the blocks, no other text.

## Content:
{}"#,
                document_text
            ),
            ContentKind::Flashcard => format!(
                r#"Generate flashcards based on the following content.

## Output format:
Each flashcard is a block. Separate blocks with a line containing only ---
Each block looks exactly like this:

Q: <question>
A: <answer>

Keep every question and answer on a single line. Output only the blocks, no other text.

## Content:
{}"#,
                document_text
            ),
            ContentKind::CribSheet => format!(
                "Generate crib sheets (concise, easy to read summaries) in Markdown based on the following content:\n\n{}",
                document_text
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_field() {
        let body = json!({ "flashCards": "Q: a\nA: b" });
        assert_eq!(extract_field(&body, ContentKind::Flashcard).unwrap(), "Q: a\nA: b");

        assert!(matches!(
            extract_field(&body, ContentKind::Test),
            Err(GenerationError::MissingField { field: "studyMaterial" })
        ));
        assert!(matches!(
            extract_field(&json!({ "cribSheet": "  " }), ContentKind::CribSheet),
            Err(GenerationError::EmptyContent(ContentKind::CribSheet))
        ));
    }

    #[test]
    fn test_document_round_trip() {
        let encoded = encode_document("Mitochondria make ATP.".as_bytes());
        assert_eq!(decode_document_text(&encoded).unwrap(), "Mitochondria make ATP.");
        assert!(matches!(
            decode_document_text(&encode_document(b"   ")),
            Err(GenerationError::EmptyDocument)
        ));
        assert!(matches!(
            decode_document_text("not base64!"),
            Err(GenerationError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_request_body_wire_format() {
        let body = serde_json::to_value(GenerationRequestBody {
            file_content: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(body, json!({ "fileContent": "abc" }));
    }

    #[test]
    fn test_endpoint_url() {
        let generator =
            RemoteGenerator::new("http://127.0.0.1:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            generator.endpoint_url(ContentKind::CribSheet),
            "http://127.0.0.1:3000/api/generate-crib-sheet"
        );
    }

    #[test]
    fn test_prompts_describe_parser_format() {
        let test_prompt = GenerationPrompt::user(ContentKind::Test, "photosynthesis");
        assert!(test_prompt.contains("Correct answer: <letter>"));
        assert!(test_prompt.ends_with("photosynthesis"));
        assert!(GenerationPrompt::user(ContentKind::Flashcard, "x").contains("Q: <question>"));
    }

    #[tokio::test]
    async fn test_chat_generator_requires_api_key() {
        let generator =
            ChatCompletionGenerator::new(ChatConfig::default(), Duration::from_secs(5)).unwrap();
        let result = generator
            .generate(ContentKind::Test, encode_document(b"some notes"))
            .await;
        assert!(matches!(result, Err(GenerationError::NotConfigured)));
    }
}
