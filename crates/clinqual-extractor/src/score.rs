//! Score extractor
//!
//! Finds score mentions, captures their raw value, normalizes it and keeps
//! the mention only when the value is valid. Invalid captures are treated
//! as pattern false positives and dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use clinqual_core::{
    ClinqualError, ConfigError, Document, NormalizedValue, Result, ScoreConfig,
    ScoreNormalization, Span, TextAttr,
};

use crate::pattern::{AttrText, CaptureWindow, PatternMatch, PatternMatcher};
use crate::{merge_entities, vocab, Pipe};

/// User-supplied normalization function
pub type NormalizeFn = Arc<dyn Fn(&str) -> Option<NormalizedValue> + Send + Sync>;

/// Raw capture to value conversion
#[derive(Clone)]
pub enum Normalizer {
    Integer,
    Float,
    Table(BTreeMap<String, f64>),
    Categories(BTreeMap<String, String>),
    Custom(NormalizeFn),
}

impl Normalizer {
    /// Normalize a raw capture, `None` when it cannot be converted
    pub fn normalize(&self, raw: &str) -> Option<NormalizedValue> {
        let raw = raw.trim();
        match self {
            Self::Integer => raw.parse().ok().map(NormalizedValue::Integer),
            Self::Float => raw.replace(',', ".").parse().ok().map(NormalizedValue::Float),
            Self::Table(values) => values
                .get(&raw.to_lowercase())
                .copied()
                .map(NormalizedValue::Float),
            Self::Categories(values) => values
                .get(&raw.to_lowercase())
                .cloned()
                .map(NormalizedValue::Category),
            Self::Custom(f) => f(raw),
        }
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "Integer"),
            Self::Float => write!(f, "Float"),
            Self::Table(values) => f.debug_tuple("Table").field(values).finish(),
            Self::Categories(values) => f.debug_tuple("Categories").field(values).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl From<&ScoreNormalization> for Normalizer {
    fn from(normalization: &ScoreNormalization) -> Self {
        match normalization {
            ScoreNormalization::Integer => Self::Integer,
            ScoreNormalization::Float => Self::Float,
            ScoreNormalization::Table { values } => Self::Table(lowercase_keys(values)),
            ScoreNormalization::Categories { values } => Self::Categories(lowercase_keys(values)),
        }
    }
}

fn lowercase_keys<V: Clone>(values: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    values
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
        .collect()
}

/// Named score extractor
#[derive(Debug, Clone)]
pub struct ScoreExtractor {
    name: String,
    patterns: PatternMatcher,
    value_extract: Option<Regex>,
    normalizer: Normalizer,
    valid_range: Option<[f64; 2]>,
}

impl ScoreExtractor {
    /// Build an extractor; spans it produces are labeled `name`
    pub fn new(name: &str, config: &ScoreConfig) -> Result<Self> {
        if config.regex.is_empty() {
            return Err(ConfigError::MissingRequired(format!("score {name}: regex")).into());
        }
        let attr = TextAttr::from_str(&config.attr)?;

        let mut patterns = PatternMatcher::new(attr)
            .with_ignore_excluded(config.ignore_excluded)
            .with_window(CaptureWindow::after(config.window));
        for pattern in &config.regex {
            patterns.add(name, pattern)?;
        }

        let value_extract = config
            .value_extract
            .as_deref()
            .map(|pattern| {
                let regex = Regex::new(pattern).map_err(|e| ClinqualError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
                if regex.captures_len() < 2 {
                    return Err(ClinqualError::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: "value_extract needs a capturing group".to_string(),
                    });
                }
                Ok(regex)
            })
            .transpose()?;

        if let Some([min, max]) = config.valid_range {
            if min > max {
                return Err(ConfigError::InvalidValue {
                    key: format!("scores.{name}.valid_range"),
                    value: format!("[{min}, {max}]"),
                }
                .into());
            }
        }

        Ok(Self {
            name: name.to_string(),
            patterns,
            value_extract,
            normalizer: Normalizer::from(&config.normalization),
            valid_range: config.valid_range,
        })
    }

    /// Built-in score by name (`charlson`, `emergency_priority`)
    pub fn builtin(name: &str) -> Result<Self> {
        let config = vocab::score_config(name).ok_or_else(|| ConfigError::InvalidValue {
            key: "score".to_string(),
            value: name.to_string(),
        })?;
        Self::new(name, &config)
    }

    /// Replace the normalizer, e.g. with a custom function
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Score spans with their values; invalid captures are dropped
    pub fn extract(&self, doc: &Document) -> Vec<Span> {
        self.patterns
            .find_iter(doc, 0..doc.len())
            .filter_map(|m| {
                let raw = self.raw_value(doc, &m);
                let Some(raw) = raw else {
                    debug!(score = %self.name, start = m.span.start, "no value captured");
                    return None;
                };
                let Some(value) = self.normalizer.normalize(&raw) else {
                    debug!(score = %self.name, raw = %raw, "value failed normalization");
                    return None;
                };
                if !self.in_range(&value) {
                    debug!(score = %self.name, value = %value, "value out of range");
                    return None;
                }
                Some(m.span.with_value(value))
            })
            .collect()
    }

    fn raw_value(&self, doc: &Document, m: &PatternMatch) -> Option<String> {
        if let Some(group) = m.group() {
            return Some(group.to_string());
        }
        let regex = self.value_extract.as_ref()?;
        let after = AttrText::build(
            doc,
            m.after(),
            self.patterns.attr(),
            self.patterns.ignore_excluded(),
        );
        regex
            .captures(&after.text)
            .and_then(|c| c.get(1))
            .map(|g| g.as_str().to_string())
    }

    fn in_range(&self, value: &NormalizedValue) -> bool {
        match (self.valid_range, value.as_f64()) {
            (Some([min, max]), Some(v)) => (min..=max).contains(&v),
            _ => true,
        }
    }

    pub fn process(&self, doc: &mut Document) -> Result<()> {
        let found = self.extract(doc);
        debug!(score = %self.name, found = found.len(), "score extraction");
        merge_entities(doc, found)
    }
}

impl Pipe for ScoreExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, doc: &mut Document) -> Result<()> {
        ScoreExtractor::process(self, doc)
    }
}

// ============================================================================
// Tests
// ============================================================================
