//! Domain models
//!
//! Raw strings arrive from three places (the webhook body, the model reply and
//! Drive file metadata). Each is deserialized into a plain raw struct first and
//! then validated by an explicit function into its typed counterpart.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::time::{parse_exif_timestamp, parse_solve_time};

/// Puzzle difficulty as shown on the completion screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Case-insensitive parse; anything but easy/medium/hard is rejected.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ValidationError::UnknownDifficulty(value.to_string())),
        }
    }

    /// Canonical lowercase string, as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Difficulty::parse(s)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON object the vision model is asked to produce, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct RawPuzzleReply {
    pub difficulty_level: String,
    pub time_to_solve: String,
}

/// Validated extraction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParsedPuzzleResult {
    pub difficulty: Difficulty,
    /// Solve time in whole seconds
    pub time_to_solve_secs: u32,
}

impl ParsedPuzzleResult {
    pub fn from_raw(raw: &RawPuzzleReply) -> Result<Self, ValidationError> {
        Ok(Self {
            difficulty: Difficulty::parse(&raw.difficulty_level)?,
            time_to_solve_secs: parse_solve_time(&raw.time_to_solve)?,
        })
    }
}

/// Drive file metadata of interest: when the screenshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotMetadata {
    pub time: NaiveDateTime,
}

impl ScreenshotMetadata {
    /// Extract `imageMediaMetadata.time` from a Drive `files.get` response.
    pub fn from_drive_json(file: &Value) -> Result<Self, ValidationError> {
        let raw = file
            .get("imageMediaMetadata")
            .and_then(|m| m.get("time"))
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingField("imageMediaMetadata.time".to_string()))?;

        Ok(Self {
            time: parse_exif_timestamp(raw)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawWebhookPayload {
    file_id: Option<Value>,
}

/// Inbound webhook body: `{"file_id": "<string>"}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub file_id: String,
}

impl WebhookPayload {
    /// Parse and validate a raw request body.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let raw: RawWebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

        match raw.file_id {
            Some(Value::String(id)) if !id.trim().is_empty() => Ok(Self { file_id: id }),
            _ => Err(ValidationError::MissingField("file_id".to_string())),
        }
    }
}
