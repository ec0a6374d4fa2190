//! Vision model client (Anthropic Messages API)
//!
//! The request ends with an assistant turn containing just `{`, so the model
//! continues a JSON object instead of writing prose. The reply is the rest of
//! that object; prefixing `{` restores a parseable document. Together with a
//! small `max_tokens` this keeps the output terse enough to parse strictly.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sudoku_common::models::RawPuzzleReply;
use sudoku_common::{ParsedPuzzleResult, ValidationError};
use thiserror::Error;
use tracing::{debug, info};

use crate::secrets::{names, SecretError, SecretProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const RESPONSE_PRIMER: &str = "{";

const PROMPT: &str = r#"This is a screenshot of the New York Times games app, of a finished Sudoku.
Extract the difficulty level and completion time from the image.

Return ONLY a JSON object with this structure, and nothing else:
{
    "difficulty_level": "the difficulty level shown in the image",
    "time_to_solve": "the completion time shown in the image"
}"#;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("inference request failed: {0}")]
    Transport(String),

    #[error("inference API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("expected exactly one content block, got {0}")]
    UnexpectedBlockCount(usize),

    #[error("model returned a non-text content block")]
    NonTextBlock,

    #[error("model reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("model reply failed validation: {0}")]
    Validation(#[from] ValidationError),
}

/// Turns a normalised screenshot into structured fields
#[async_trait]
pub trait PuzzleExtractor: Send + Sync {
    async fn extract(&self, jpeg: &[u8]) -> Result<ParsedPuzzleResult, InferenceError>;
}

// ── Request/response wire types ──

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Blocks(Vec<RequestBlock<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

fn build_request<'a>(model: &'a str, max_tokens: u32, jpeg: &[u8]) -> MessagesRequest<'a> {
    let data = base64::engine::general_purpose::STANDARD.encode(jpeg);

    MessagesRequest {
        model,
        max_tokens,
        messages: vec![
            Message {
                role: "user",
                content: MessageContent::Blocks(vec![
                    RequestBlock::Text { text: PROMPT },
                    RequestBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: "image/jpeg",
                            data,
                        },
                    },
                ]),
            },
            Message {
                role: "assistant",
                content: MessageContent::Text(RESPONSE_PRIMER),
            },
        ],
    }
}

/// The one text block of a reply, or why there isn't one.
fn single_text_block(response: MessagesResponse) -> Result<String, InferenceError> {
    let count = response.content.len();
    if count != 1 {
        return Err(InferenceError::UnexpectedBlockCount(count));
    }
    match response.content.into_iter().next() {
        Some(ResponseBlock::Text { text }) => Ok(text),
        _ => Err(InferenceError::NonTextBlock),
    }
}

/// Rebuild the primed JSON object and validate its fields.
///
/// A typical completion is `\n    "difficulty_level": "Hard",\n    "time_to_solve": "12:37"\n}`.
pub fn parse_model_reply(completion: &str) -> Result<ParsedPuzzleResult, InferenceError> {
    let full_json = format!("{}{}", RESPONSE_PRIMER, completion);
    let raw: RawPuzzleReply = serde_json::from_str(full_json.trim())
        .map_err(|e| InferenceError::InvalidJson(e.to_string()))?;
    Ok(ParsedPuzzleResult::from_raw(&raw)?)
}

pub struct AnthropicClient {
    http: reqwest::Client,
    secrets: Arc<dyn SecretProvider>,
    api_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(
        http: reqwest::Client,
        secrets: Arc<dyn SecretProvider>,
        api_url: &str,
        model: &str,
        max_tokens: u32,
    ) -> Self {
        Self {
            http,
            secrets,
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl PuzzleExtractor for AnthropicClient {
    async fn extract(&self, jpeg: &[u8]) -> Result<ParsedPuzzleResult, InferenceError> {
        let api_key = self.secrets.get(names::CLAUDE_API_KEY).await?;
        let request = build_request(&self.model, self.max_tokens, jpeg);

        debug!(model = %self.model, image_bytes = jpeg.len(), "Sending screenshot to vision model");
        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Transport(format!("invalid response body: {}", e)))?;

        let text = single_text_block(parsed)?;
        let result = parse_model_reply(&text)?;
        info!(
            difficulty = %result.difficulty,
            time_to_solve_secs = result.time_to_solve_secs,
            "Extracted puzzle result"
        );
        Ok(result)
    }
}
