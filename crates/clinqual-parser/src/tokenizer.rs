//! Reference tokenizer and sentence segmenter
//!
//! Token boundaries follow Unicode word segmentation (UAX #29). Whitespace
//! is attached to the preceding token so that the document text can be
//! rebuilt from tokens alone; leading whitespace of the input is dropped.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use clinqual_core::{Document, RawToken, TokenizerConfig};

use crate::normalize::normalize;
use crate::{ParserError, Result};

/// Elided French words split off the following word
static ELISION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(l|d|j|m|n|s|t|c|qu|jusqu|lorsqu|puisqu|quoiqu)['’]\w")
        .expect("elision pattern is valid")
});

const SENTENCE_END: &[&str] = &[".", "!", "?", "…"];

/// Text to [`Document`] converter
#[derive(Debug, Clone)]
pub struct Tokenizer {
    config: TokenizerConfig,
    exclusions: Vec<Regex>,
}

impl Tokenizer {
    /// Create a tokenizer with the default configuration
    pub fn new() -> Self {
        Self {
            config: TokenizerConfig::default(),
            exclusions: Vec::new(),
        }
    }

    /// Create a tokenizer, compiling its exclusion patterns
    pub fn with_config(config: TokenizerConfig) -> Result<Self> {
        let exclusions = config
            .exclusion_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ParserError::InvalidPattern {
                    pattern: p.clone(),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { config, exclusions })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Split text into tokens, without sentence segmentation
    ///
    /// Used to tokenize vocabulary phrases the same way as documents.
    pub fn words(&self, text: &str) -> Vec<RawToken> {
        self.split(text).into_iter().map(|(token, _)| token).collect()
    }

    /// Tokenize and segment a text into a document
    pub fn tokenize(&self, text: &str) -> Result<Document> {
        let mut pieces = self.split(text);
        self.mark_excluded(text, &mut pieces);

        let sentences = self.sentences(&pieces);
        let tokens: Vec<RawToken> = pieces.into_iter().map(|(token, _)| token).collect();

        tracing::trace!(
            tokens = tokens.len(),
            sentences = sentences.len(),
            "tokenized document"
        );
        Ok(Document::from_parts(tokens, sentences)?)
    }

    /// Tokens with their byte range in `text`
    fn split(&self, text: &str) -> Vec<(RawToken, Range<usize>)> {
        let mut out: Vec<(RawToken, Range<usize>)> = Vec::new();

        for (offset, segment) in text.split_word_bound_indices() {
            if segment.chars().all(char::is_whitespace) {
                if let Some((last, _)) = out.last_mut() {
                    last.whitespace.push_str(segment);
                }
                continue;
            }

            let split_at = if self.config.split_elisions {
                ELISION
                    .find(segment)
                    .map(|m| m.end() - m.as_str().chars().last().map(char::len_utf8).unwrap_or(0))
            } else {
                None
            };

            match split_at {
                Some(at) if at < segment.len() => {
                    out.push(piece(&segment[..at], offset));
                    out.push(piece(&segment[at..], offset + at));
                }
                _ => out.push(piece(segment, offset)),
            }
        }

        out
    }

    fn mark_excluded(&self, text: &str, pieces: &mut [(RawToken, Range<usize>)]) {
        for regex in &self.exclusions {
            for m in regex.find_iter(text) {
                if m.start() == m.end() {
                    continue;
                }
                for (token, range) in pieces.iter_mut() {
                    if range.start < m.end() && m.start() < range.end {
                        token.excluded = true;
                    }
                }
            }
        }
    }

    fn sentences(&self, pieces: &[(RawToken, Range<usize>)]) -> Vec<Range<usize>> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for (i, (token, _)) in pieces.iter().enumerate() {
            let next_is_terminal = pieces
                .get(i + 1)
                .map(|(next, _)| SENTENCE_END.contains(&next.text.as_str()))
                .unwrap_or(false);
            let terminal = SENTENCE_END.contains(&token.text.as_str()) && !next_is_terminal;
            let line_break = self.config.newline_ends_sentence && token.whitespace.contains('\n');

            if terminal || line_break {
                sentences.push(start..i + 1);
                start = i + 1;
            }
        }
        if start < pieces.len() {
            sentences.push(start..pieces.len());
        }

        sentences
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn piece(text: &str, offset: usize) -> (RawToken, Range<usize>) {
    let token = RawToken {
        text: text.to_string(),
        whitespace: String::new(),
        norm: normalize(text),
        excluded: false,
    };
    (token, offset..offset + text.len())
}

// ============================================================================
// Tests
// ============================================================================
