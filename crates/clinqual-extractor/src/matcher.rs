//! Entity term matcher
//!
//! Promotes phrase and pattern matches of a labeled vocabulary to entities.

use std::str::FromStr;

use tracing::debug;

use clinqual_core::{ConfigError, Document, MatcherConfig, Result, Span, TextAttr};
use clinqual_parser::Tokenizer;

use crate::pattern::PatternMatcher;
use crate::phrase::PhraseMatcher;
use crate::{merge_entities, Pipe};

/// Vocabulary-driven entity recognizer
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    phrases: PhraseMatcher,
    patterns: PatternMatcher,
}

impl EntityMatcher {
    pub fn new(config: &MatcherConfig, tokenizer: &Tokenizer) -> Result<Self> {
        if config.vocabulary.is_empty() {
            return Err(ConfigError::MissingRequired("matcher.vocabulary".to_string()).into());
        }
        let attr = TextAttr::from_str(&config.attr)?;

        let mut phrases = PhraseMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
        if let Some(fuzzy) = &config.fuzzy {
            phrases = phrases.with_fuzzy(fuzzy);
        }
        phrases.build_patterns(tokenizer, &config.vocabulary.terms);

        let mut patterns = PatternMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
        patterns.build_patterns(&config.vocabulary.regex)?;

        Ok(Self { phrases, patterns })
    }

    /// Every match, overlapping ones included
    pub fn matches(&self, doc: &Document) -> Vec<Span> {
        let mut spans = self.phrases.matches(doc);
        spans.extend(self.patterns.matches(doc));
        spans
    }

    pub fn process(&self, doc: &mut Document) -> Result<()> {
        let spans = self.matches(doc);
        debug!(matches = spans.len(), "entity matcher");
        merge_entities(doc, spans)
    }
}

impl Pipe for EntityMatcher {
    fn name(&self) -> &str {
        "matcher"
    }

    fn process(&self, doc: &mut Document) -> Result<()> {
        EntityMatcher::process(self, doc)
    }
}
