//! # Sudoku Common Library
//!
//! Shared code for the sudoku screenshot webhook:
//! - Domain models (difficulty, parsed results, screenshot metadata, payloads)
//! - Parse-and-validate functions for model output and Drive metadata
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result, ValidationError};
pub use models::{Difficulty, ParsedPuzzleResult, ScreenshotMetadata, WebhookPayload};
