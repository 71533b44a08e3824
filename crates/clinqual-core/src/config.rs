//! Clinqual Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults that run every built-in qualifier.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::QualifierKind;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Reference tokenizer settings
    pub tokenizer: TokenizerConfig,

    /// Entity vocabulary promoted to the canonical entity set
    pub matcher: Option<MatcherConfig>,

    /// Table detector (disabled when absent)
    pub tables: Option<TablesConfig>,

    /// Section detector (disabled when absent)
    pub sections: Option<SectionsConfig>,

    /// Score extractors, keyed by score name
    pub scores: BTreeMap<String, ScoreConfig>,

    /// Qualifier passes
    pub qualifiers: QualifiersConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("CLINQUAL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("CLINQUAL_LOG_JSON") {
            config.logging.json_format = parse_bool("CLINQUAL_LOG_JSON", &json)?;
        }
        if let Ok(attr) = std::env::var("CLINQUAL_ATTR") {
            attr.parse::<crate::TextAttr>()?;
            config.qualifiers.set_attr(&attr);
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        if let Ok(level) = std::env::var("CLINQUAL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("CLINQUAL_LOG_JSON") {
            self.logging.json_format = parse_bool("CLINQUAL_LOG_JSON", &json)?;
        }
        if let Ok(attr) = std::env::var("CLINQUAL_ATTR") {
            attr.parse::<crate::TextAttr>()?;
            self.qualifiers.set_attr(&attr);
        }

        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Reference tokenizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Split French elisions ("n'est" -> "n'" "est")
    pub split_elisions: bool,

    /// End sentences at line breaks
    pub newline_ends_sentence: bool,

    /// Regexes over the raw text; tokens they touch are marked excluded
    pub exclusion_patterns: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            split_elisions: true,
            newline_ends_sentence: true,
            exclusion_patterns: Vec::new(),
        }
    }
}

/// Ordered mapping from vocabulary key to phrases and patterns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Phrase lists, matched token by token
    pub terms: BTreeMap<String, Vec<String>>,

    /// Regular expressions, matched over the attribute text
    pub regex: BTreeMap<String, Vec<String>>,
}

impl Vocabulary {
    /// Create an empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Add phrases under a key
    pub fn with_terms<I, S>(mut self, key: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terms
            .entry(key.into())
            .or_default()
            .extend(terms.into_iter().map(Into::into));
        self
    }

    /// Add patterns under a key
    pub fn with_regex<I, S>(mut self, key: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regex
            .entry(key.into())
            .or_default()
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Every key with at least one phrase or pattern
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let mut keys: Vec<&str> = self
            .terms
            .iter()
            .chain(self.regex.iter())
            .filter(|(_, values)| !values.is_empty())
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().next().is_none()
    }
}

/// Fuzzy phrase matching options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Maximum Levenshtein distance per phrase token
    pub max_distance: usize,

    /// Phrase tokens shorter than this are always matched exactly
    pub min_token_len: usize,

    /// When set, only these phrase tokens may match fuzzily
    pub eligible_tokens: Option<Vec<String>>,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            max_distance: 1,
            min_token_len: 5,
            eligible_tokens: None,
        }
    }
}

/// Entity matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Entity vocabulary; keys become entity labels
    pub vocabulary: Vocabulary,

    /// Attribute to match on (TEXT, LOWER, NORM)
    pub attr: String,

    /// Skip excluded tokens while matching
    pub ignore_excluded: bool,

    /// Fuzzy phrase matching (exact when absent)
    pub fuzzy: Option<FuzzyConfig>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            attr: "NORM".to_string(),
            ignore_excluded: false,
            fuzzy: None,
        }
    }
}

/// Section detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionsConfig {
    /// Header vocabulary; keys become section labels. Built-in when absent.
    pub vocabulary: Option<Vocabulary>,

    /// Attribute to match on (TEXT, LOWER, NORM)
    pub attr: String,

    /// Skip excluded tokens while matching
    pub ignore_excluded: bool,

    /// Only accept headers that start a line
    pub line_start_only: bool,

    /// Publish each section as an entity of the `sections` span group
    pub add_entities: bool,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            vocabulary: None,
            attr: "NORM".to_string(),
            ignore_excluded: true,
            line_start_only: true,
            add_entities: true,
        }
    }
}

/// Table detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// Regex over the attribute text matching whole tables; replaces line detection
    pub tables_pattern: Option<String>,

    /// Cell separators, each matched against a whole token
    pub sep_pattern: Vec<String>,

    /// Consecutive separator lines needed to form a table
    pub min_rows: usize,

    /// Attribute `tables_pattern` runs on (TEXT, LOWER, NORM)
    pub attr: String,

    /// Tokens already excluded neither separate cells nor match `tables_pattern`
    pub ignore_excluded: bool,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            tables_pattern: None,
            sep_pattern: vec!["¦".to_string(), r"\|".to_string()],
            min_rows: 2,
            attr: "TEXT".to_string(),
            ignore_excluded: true,
        }
    }
}

/// How a captured score string becomes a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Parse as an integer
    Integer,
    /// Parse as a float (comma decimal separator accepted)
    Float,
    /// Look the trimmed, lowercased capture up in a table
    Table { values: BTreeMap<String, f64> },
    /// Look the capture up in a table of categories
    Categories { values: BTreeMap<String, String> },
}

impl Default for ScoreNormalization {
    fn default() -> Self {
        Self::Integer
    }
}

/// Score extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Patterns locating the score; group 1, when present, holds the value
    pub regex: Vec<String>,

    /// Pattern with one capturing group, applied to the window after a match
    pub value_extract: Option<String>,

    /// Captured value normalization
    pub normalization: ScoreNormalization,

    /// Inclusive `[min, max]` range for numeric values
    pub valid_range: Option<[f64; 2]>,

    /// Number of tokens after the match searched by `value_extract`
    pub window: usize,

    /// Attribute to match on (TEXT, LOWER, NORM)
    pub attr: String,

    /// Skip excluded tokens while matching
    pub ignore_excluded: bool,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            regex: Vec::new(),
            value_extract: None,
            normalization: ScoreNormalization::Integer,
            valid_range: None,
            window: 20,
            attr: "TEXT".to_string(),
            ignore_excluded: false,
        }
    }
}

/// Configuration for one qualifier pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualifierConfig {
    /// Attribute to match on (TEXT, LOWER, NORM)
    pub attr: String,

    /// Cue vocabulary. Reserved keys: `termination`, `pseudo`.
    /// Built-in vocabulary of the kind when absent.
    pub vocabulary: Option<Vocabulary>,

    /// `all` or `any`
    pub annotation_scheme: String,

    /// Legacy flag; conflicts with `span_getter`
    pub on_ents_only: Option<bool>,

    /// Entity groups to qualify; empty list disables entity restriction
    pub span_getter: Option<Vec<String>>,

    /// Record the cues behind each entity value
    pub explain: bool,

    /// Force tokens of matching sections to positive
    pub use_sections: bool,

    /// Section labels used when `use_sections` is set
    pub section_labels: Vec<String>,

    /// Add scope boundaries at clause punctuation
    pub split_on_punctuation: bool,

    /// Skip excluded tokens while matching
    pub ignore_excluded: bool,

    /// Fuzzy phrase matching (exact when absent)
    pub fuzzy: Option<FuzzyConfig>,
}

impl Default for QualifierConfig {
    fn default() -> Self {
        Self {
            attr: "NORM".to_string(),
            vocabulary: None,
            annotation_scheme: "all".to_string(),
            on_ents_only: None,
            span_getter: None,
            explain: false,
            use_sections: false,
            section_labels: Vec::new(),
            split_on_punctuation: false,
            ignore_excluded: false,
            fuzzy: None,
        }
    }
}

impl QualifierConfig {
    /// Defaults for a kind: history and family follow their sections
    pub fn for_kind(kind: QualifierKind) -> Self {
        match kind {
            QualifierKind::History => Self {
                use_sections: true,
                section_labels: vec!["antécédents".to_string()],
                ..Self::default()
            },
            QualifierKind::Family => Self {
                use_sections: true,
                section_labels: vec!["antécédents familiaux".to_string()],
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// One optional block per qualifier kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualifiersConfig {
    pub negation: Option<QualifierConfig>,
    pub family: Option<QualifierConfig>,
    pub hypothesis: Option<QualifierConfig>,
    pub reported_speech: Option<QualifierConfig>,
    pub history: Option<QualifierConfig>,

    /// Kinds skipped even when configured
    pub disabled: Vec<QualifierKind>,
}

impl Default for QualifiersConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            negation: Some(QualifierConfig::for_kind(QualifierKind::Negation)),
            family: Some(QualifierConfig::for_kind(QualifierKind::Family)),
            hypothesis: Some(QualifierConfig::for_kind(QualifierKind::Hypothesis)),
            reported_speech: Some(QualifierConfig::for_kind(QualifierKind::ReportedSpeech)),
            history: Some(QualifierConfig::for_kind(QualifierKind::History)),
        }
    }
}

impl QualifiersConfig {
    /// Configured passes, in pipeline order
    pub fn enabled(&self) -> Vec<(QualifierKind, &QualifierConfig)> {
        QualifierKind::ALL
            .iter()
            .filter(|kind| !self.disabled.contains(kind))
            .filter_map(|kind| self.get(*kind).map(|c| (*kind, c)))
            .collect()
    }

    pub fn get(&self, kind: QualifierKind) -> Option<&QualifierConfig> {
        match kind {
            QualifierKind::Negation => self.negation.as_ref(),
            QualifierKind::Family => self.family.as_ref(),
            QualifierKind::Hypothesis => self.hypothesis.as_ref(),
            QualifierKind::ReportedSpeech => self.reported_speech.as_ref(),
            QualifierKind::History => self.history.as_ref(),
        }
    }

    fn set_attr(&mut self, attr: &str) {
        for config in [
            &mut self.negation,
            &mut self.family,
            &mut self.hypothesis,
            &mut self.reported_speech,
            &mut self.history,
        ]
        .into_iter()
        .flatten()
        {
            config.attr = attr.to_string();
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Conflicting options: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.qualifiers.enabled().len(), 5);
        assert!(config.sections.is_none());
        assert_eq!(config.logging.level, "warn");

        let history = config.qualifiers.get(QualifierKind::History).unwrap();
        assert!(history.use_sections);
        assert_eq!(history.annotation_scheme, "all");
    }

    #[test]
    fn test_from_toml_str() {
        let config = AppConfig::from_toml_str(
            r#"
            [sections]
            line_start_only = false

            [scores.priority]
            regex = ['Priorité:\s*(\d)']
            valid_range = [0.0, 5.0]

            [qualifiers.negation]
            annotation_scheme = "any"
            explain = true

            [qualifiers.negation.vocabulary.terms]
            negation = ["pas", "sans"]
            termination = ["mais"]
            "#,
        )
        .unwrap();

        assert!(!config.sections.unwrap().line_start_only);
        let priority = &config.scores["priority"];
        assert_eq!(priority.valid_range, Some([0.0, 5.0]));
        assert_eq!(priority.normalization, ScoreNormalization::Integer);

        let negation = config.qualifiers.negation.unwrap();
        assert_eq!(negation.annotation_scheme, "any");
        let vocab = negation.vocabulary.unwrap();
        assert_eq!(vocab.keys().collect::<Vec<_>>(), vec!["negation", "termination"]);
        // blocks not mentioned keep their defaults
        assert!(config.qualifiers.history.is_some());
    }

    #[test]
    fn test_tables_config() {
        assert!(AppConfig::default().tables.is_none());

        let config = AppConfig::from_toml_str(
            r#"
            [tables]
            sep_pattern = [';']
            min_rows = 3
            "#,
        )
        .unwrap();
        let tables = config.tables.unwrap();
        assert_eq!(tables.sep_pattern, vec![";"]);
        assert_eq!(tables.min_rows, 3);
        assert_eq!(tables.attr, "TEXT");
        assert!(tables.ignore_excluded);
        assert!(tables.tables_pattern.is_none());
    }

    #[test]
    fn test_disabled_qualifiers() {
        let config = AppConfig::from_toml_str(
            r#"
            [qualifiers]
            disabled = ["reported_speech", "hypothesis"]
            "#,
        )
        .unwrap();
        let kinds: Vec<QualifierKind> = config
            .qualifiers
            .enabled()
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(
            kinds,
            vec![QualifierKind::Negation, QualifierKind::Family, QualifierKind::History]
        );
    }

    #[test]
    fn test_table_normalization_parse() {
        let config = AppConfig::from_toml_str(
            r#"
            [scores.grade]
            regex = ['grade\s*(\w+)']
            normalization = { kind = "table", values = { i = 1.0, ii = 2.0 } }
            "#,
        )
        .unwrap();
        match &config.scores["grade"].normalization {
            ScoreNormalization::Table { values } => assert_eq!(values["ii"], 2.0),
            other => panic!("unexpected normalization {other:?}"),
        }
    }

    #[test]
    fn test_from_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = 3").unwrap();

        match AppConfig::from_file(file.path()) {
            Err(ConfigError::ParseError { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(
            AppConfig::from_file("/nonexistent/clinqual.toml"),
            Err(ConfigError::FileReadError { .. })
        ));
    }

    #[test]
    fn test_vocabulary_builder() {
        let vocab = Vocabulary::new()
            .with_terms("family", ["père", "mère"])
            .with_regex("family", [r"\bfr[eè]re\b"])
            .with_terms("termination", Vec::<String>::new());
        assert_eq!(vocab.keys().collect::<Vec<_>>(), vec!["family"]);
        assert!(!vocab.is_empty());
        assert!(Vocabulary::new().is_empty());
    }
}
