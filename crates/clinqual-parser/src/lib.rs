//! Clinqual Parser - Tokenization and normalization of clinical text
//!
//! Turns raw text into a [`Document`](clinqual_core::Document):
//! - Unicode word-boundary tokenization with French elision splitting
//! - Sentence segmentation on terminal punctuation and line breaks
//! - NORM attribute (lowercase, accent folding, quote unification)
//! - Exclusion patterns marking tokens that matchers may skip

pub mod normalize;
pub mod tokenizer;

pub use normalize::normalize;
pub use tokenizer::Tokenizer;

use std::io::Read;
use std::path::Path;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while turning text into documents
#[derive(Error, Debug)]
pub enum ParserError {
    /// IO error while reading the input
    #[error("IO error reading input: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Input is not valid UTF-8
    #[error("Text encoding error: {0}")]
    EncodingError(String),

    /// Exclusion pattern does not compile
    #[error("Invalid exclusion pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Token/sentence layout rejected by the document model
    #[error(transparent)]
    Document(#[from] clinqual_core::ClinqualError),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Input
// ============================================================================

/// Read a UTF-8 text file; `-` reads standard input
pub fn read_text(path: &Path) -> Result<String> {
    let display = path.display().to_string();
    let mut bytes = Vec::new();

    if display == "-" {
        std::io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|e| ParserError::IoError {
                path: display.clone(),
                source: e,
            })?;
    } else {
        bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: display.clone(),
            source: e,
        })?;
    }

    String::from_utf8(bytes).map_err(|e| ParserError::EncodingError(format!("{display}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
