//! Clinqual Core - Document model, qualifier kinds, and shared types
//!
//! This crate defines the core abstractions used throughout clinqual:
//! - Document model (tokens, sentences, spans, entities, sections)
//! - Qualifier kinds and their per-token / per-entity slots
//! - Common error types
//! - Configuration management

pub mod config;
pub mod document;

pub use config::{
    AppConfig, ConfigError, FuzzyConfig, LoggingConfig, MatcherConfig, QualifierConfig,
    QualifiersConfig, ScoreConfig, ScoreNormalization, SectionsConfig, TablesConfig,
    TokenizerConfig, Vocabulary,
};
pub use document::{
    filter_spans, Document, Entity, NormalizedValue, RawToken, Section, Sentence, Span, Token,
    ENTS_GROUP,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for clinqual operations
#[derive(Error, Debug)]
pub enum ClinqualError {
    #[error("Invalid span [{start}, {end}) for document of {len} tokens")]
    InvalidSpan { start: usize, end: usize, len: usize },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read input {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClinqualError>;

// ============================================================================
// Qualifier Kinds
// ============================================================================

/// Contextual qualifiers attached to tokens and entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualifierKind {
    Negation,
    Family,
    Hypothesis,
    ReportedSpeech,
    History,
}

impl QualifierKind {
    /// All kinds, in default pipeline order
    pub const ALL: [QualifierKind; 5] = [
        Self::Negation,
        Self::Family,
        Self::Hypothesis,
        Self::ReportedSpeech,
        Self::History,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negation => "negation",
            Self::Family => "family",
            Self::Hypothesis => "hypothesis",
            Self::ReportedSpeech => "reported_speech",
            Self::History => "history",
        }
    }

    /// Label used for the positive scope spans this qualifier registers
    pub fn span_label(&self) -> &'static str {
        match self {
            Self::Negation => "NEG",
            Self::Family => "FAMILY",
            Self::Hypothesis => "HYP",
            Self::ReportedSpeech => "REPORTED",
            Self::History => "ATCD",
        }
    }

    /// Readable label for a tri-state slot value
    ///
    /// `None` means no scope covered the token during the pass.
    pub fn label(&self, value: Option<bool>) -> &'static str {
        match (self, value) {
            (_, None) => "NOTSET",
            (_, Some(true)) => self.span_label(),
            (Self::Negation, Some(false)) => "AFF",
            (Self::Family, Some(false)) => "PATIENT",
            (Self::Hypothesis, Some(false)) => "CERT",
            (Self::ReportedSpeech, Some(false)) => "DIRECT",
            (Self::History, Some(false)) => "CURRENT",
        }
    }
}

impl std::fmt::Display for QualifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QualifierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "negation" => Ok(Self::Negation),
            "family" => Ok(Self::Family),
            "hypothesis" => Ok(Self::Hypothesis),
            "reported_speech" | "rspeech" => Ok(Self::ReportedSpeech),
            "history" | "antecedents" => Ok(Self::History),
            _ => Err(ConfigError::InvalidValue {
                key: "qualifier".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Fixed set of optional qualifier values, one slot per kind
///
/// Used both as the tri-state per-token attribute and as the
/// aggregated per-entity result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifierSlots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_speech: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<bool>,
}

impl QualifierSlots {
    /// Read the slot of a kind
    pub fn get(&self, kind: QualifierKind) -> Option<bool> {
        match kind {
            QualifierKind::Negation => self.negation,
            QualifierKind::Family => self.family,
            QualifierKind::Hypothesis => self.hypothesis,
            QualifierKind::ReportedSpeech => self.reported_speech,
            QualifierKind::History => self.history,
        }
    }

    /// Write the slot of a kind
    pub fn set(&mut self, kind: QualifierKind, value: bool) {
        *self.slot_mut(kind) = Some(value);
    }

    fn slot_mut(&mut self, kind: QualifierKind) -> &mut Option<bool> {
        match kind {
            QualifierKind::Negation => &mut self.negation,
            QualifierKind::Family => &mut self.family,
            QualifierKind::Hypothesis => &mut self.hypothesis,
            QualifierKind::ReportedSpeech => &mut self.reported_speech,
            QualifierKind::History => &mut self.history,
        }
    }
}

// ============================================================================
// Text Attributes
// ============================================================================

/// Token attribute that matchers compare against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextAttr {
    /// Raw surface text, case-sensitive
    Text,
    /// Lowercased surface text
    Lower,
    /// Lowercased, accent-folded text
    #[default]
    Norm,
}

impl TextAttr {
    /// Whether matching on this attribute distinguishes case
    pub fn is_case_sensitive(&self) -> bool {
        matches!(self, Self::Text)
    }
}

impl std::str::FromStr for TextAttr {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TEXT" | "ORTH" => Ok(Self::Text),
            "LOWER" => Ok(Self::Lower),
            "NORM" => Ok(Self::Norm),
            _ => Err(ConfigError::InvalidValue {
                key: "attr".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TextAttr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::Lower => write!(f, "LOWER"),
            Self::Norm => write!(f, "NORM"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifier_slots_roundtrip() {
        let mut slots = QualifierSlots::default();
        assert_eq!(slots.get(QualifierKind::Family), None);

        slots.set(QualifierKind::Family, true);
        slots.set(QualifierKind::Negation, false);

        assert_eq!(slots.get(QualifierKind::Family), Some(true));
        assert_eq!(slots.get(QualifierKind::Negation), Some(false));
        assert_eq!(slots.get(QualifierKind::History), None);
    }

    #[test]
    fn test_qualifier_labels() {
        assert_eq!(QualifierKind::History.label(Some(true)), "ATCD");
        assert_eq!(QualifierKind::History.label(Some(false)), "CURRENT");
        assert_eq!(QualifierKind::History.label(None), "NOTSET");
        assert_eq!(QualifierKind::Negation.label(Some(false)), "AFF");
    }

    #[test]
    fn test_qualifier_kind_parse() {
        assert_eq!(
            "reported-speech".parse::<QualifierKind>().unwrap(),
            QualifierKind::ReportedSpeech
        );
        assert_eq!(
            "antecedents".parse::<QualifierKind>().unwrap(),
            QualifierKind::History
        );
        assert!("sarcasm".parse::<QualifierKind>().is_err());
    }

    #[test]
    fn test_text_attr_parse() {
        assert_eq!("norm".parse::<TextAttr>().unwrap(), TextAttr::Norm);
        assert_eq!("TEXT".parse::<TextAttr>().unwrap(), TextAttr::Text);
        assert!(TextAttr::Text.is_case_sensitive());
        assert!(!TextAttr::Lower.is_case_sensitive());
        assert!("LEMMA".parse::<TextAttr>().is_err());
    }
}
