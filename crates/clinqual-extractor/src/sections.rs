//! Section detector
//!
//! Header matches split the document into ordered, disjoint sections. Each
//! section runs from its header to the next header, or to the end of the
//! document. Text before the first header belongs to no section.
//!
//! Sections are published as entities of the `sections` span group and never
//! enter `ents`. Qualifiers reach them with `span_getter = ["sections"]`.

use std::str::FromStr;

use tracing::debug;

use clinqual_core::{
    filter_spans, Document, Result, Section, SectionsConfig, Span, TextAttr,
};
use clinqual_parser::Tokenizer;

use crate::pattern::PatternMatcher;
use crate::phrase::PhraseMatcher;
use crate::{vocab, Pipe};

/// Span group holding section header spans
pub const SECTION_TITLES_GROUP: &str = "section_titles";

/// Span group holding section spans
pub const SECTIONS_GROUP: &str = "sections";

/// Header-driven document segmentation
#[derive(Debug, Clone)]
pub struct SectionDetector {
    phrases: PhraseMatcher,
    patterns: PatternMatcher,
    line_start_only: bool,
    add_entities: bool,
}

impl SectionDetector {
    pub fn new(config: &SectionsConfig, tokenizer: &Tokenizer) -> Result<Self> {
        let attr = TextAttr::from_str(&config.attr)?;
        let vocabulary = config
            .vocabulary
            .clone()
            .unwrap_or_else(vocab::section_vocabulary);

        let mut phrases = PhraseMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
        phrases.build_patterns(tokenizer, &vocabulary.terms);
        let mut patterns = PatternMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
        patterns.build_patterns(&vocabulary.regex)?;

        Ok(Self {
            phrases,
            patterns,
            line_start_only: config.line_start_only,
            add_entities: config.add_entities,
        })
    }

    /// Detector with the built-in header vocabulary
    pub fn builtin(tokenizer: &Tokenizer) -> Result<Self> {
        Self::new(&SectionsConfig::default(), tokenizer)
    }

    /// Header spans, non-overlapping and ordered
    pub fn titles(&self, doc: &Document) -> Vec<Span> {
        let candidates: Vec<Span> = self
            .phrases
            .matches(doc)
            .into_iter()
            .chain(self.patterns.matches(doc))
            .filter(|span| !self.line_start_only || starts_line(doc, span.start))
            .collect();
        filter_spans(candidates).0
    }

    /// Sections opened by the detected headers
    pub fn sections(&self, doc: &Document) -> Vec<Section> {
        let titles = self.titles(doc);
        let ends = titles
            .iter()
            .skip(1)
            .map(|t| t.start)
            .chain(std::iter::once(doc.len()));

        titles
            .iter()
            .zip(ends)
            .map(|(title, end)| Section {
                start: title.start,
                end,
                label: title.label.clone(),
                title: title.clone(),
            })
            .collect()
    }

    pub fn process(&self, doc: &mut Document) -> Result<()> {
        let sections = self.sections(doc);
        debug!(sections = sections.len(), "detected sections");

        let titles: Vec<Span> = sections.iter().map(|s| s.title.clone()).collect();

        doc.set_span_group(SECTION_TITLES_GROUP, titles)?;
        if self.add_entities {
            let spans = sections.iter().map(Section::to_span).collect();
            doc.set_span_group(SECTIONS_GROUP, spans)?;
        }
        doc.set_sections(sections)
    }
}

impl Pipe for SectionDetector {
    fn name(&self) -> &str {
        "sections"
    }

    fn process(&self, doc: &mut Document) -> Result<()> {
        SectionDetector::process(self, doc)
    }

    fn provides_sections(&self) -> bool {
        true
    }
}

/// First token of the document, or first after a line break
fn starts_line(doc: &Document, token: usize) -> bool {
    token == 0 || doc.tokens()[token - 1].ends_line()
}

// ============================================================================
// Tests
// ============================================================================
