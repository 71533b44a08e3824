//! Document model
//!
//! A [`Document`] owns its tokens and sentences, which are fixed at
//! construction. Only the per-qualifier token slots, the entity sets,
//! the span groups and the sections change afterwards.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ClinqualError, QualifierKind, QualifierSlots, Result, TextAttr};

/// Name under which the canonical entity set is addressed in span getters
pub const ENTS_GROUP: &str = "ents";

// ============================================================================
// Values
// ============================================================================

/// Value derived from a captured text fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Integer(i64),
    Float(f64),
    Category(String),
}

impl NormalizedValue {
    /// Numeric view, if the value is numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Category(_) => None,
        }
    }
}

impl std::fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Category(v) => write!(f, "{v}"),
        }
    }
}

// ============================================================================
// Tokens and Sentences
// ============================================================================

/// Token as produced by a tokenizer, before it is placed in a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawToken {
    /// Surface text
    pub text: String,
    /// Whitespace following the token in the source text
    pub whitespace: String,
    /// Normalized form (lowercase, accent-folded)
    pub norm: String,
    /// Whether matchers running with `ignore_excluded` skip this token
    pub excluded: bool,
}

impl RawToken {
    /// Create a token whose normalized form is its lowercased text
    pub fn new(text: impl Into<String>, whitespace: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            norm: text.to_lowercase(),
            text,
            whitespace: whitespace.into(),
            excluded: false,
        }
    }
}

/// A token inside a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    index: usize,
    text: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    whitespace: String,
    norm: String,
    /// Byte offset of the token in the document text
    offset: usize,
    sentence: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    excluded: bool,
    #[serde(default)]
    qualifiers: QualifierSlots,
}

impl Token {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn whitespace(&self) -> &str {
        &self.whitespace
    }

    pub fn norm(&self) -> &str {
        &self.norm
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Index of the sentence holding this token, if any
    pub fn sentence(&self) -> Option<usize> {
        self.sentence
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Whether the token is made of punctuation only
    pub fn is_punct(&self) -> bool {
        !self.text.is_empty()
            && self
                .text
                .chars()
                .all(|c| c.is_ascii_punctuation() || "«»…–—’".contains(c))
    }

    /// Whether the token is followed by a line break
    pub fn ends_line(&self) -> bool {
        self.whitespace.contains('\n')
    }

    /// Tri-state value of a qualifier slot
    pub fn qualifier(&self, kind: QualifierKind) -> Option<bool> {
        self.qualifiers.get(kind)
    }

    pub fn qualifiers(&self) -> &QualifierSlots {
        &self.qualifiers
    }

    /// Text of the requested attribute
    pub fn attr(&self, attr: TextAttr) -> std::borrow::Cow<'_, str> {
        match attr {
            TextAttr::Text => std::borrow::Cow::Borrowed(&self.text),
            TextAttr::Lower => std::borrow::Cow::Owned(self.text.to_lowercase()),
            TextAttr::Norm => std::borrow::Cow::Borrowed(&self.norm),
        }
    }
}

/// Contiguous token range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
}

impl Sentence {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, token: usize) -> bool {
        self.start <= token && token < self.end
    }
}

// ============================================================================
// Spans, Entities, Sections
// ============================================================================

/// Labeled half-open token range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<NormalizedValue>,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            value: None,
        }
    }

    /// Attach a normalized value
    pub fn with_value(mut self, value: NormalizedValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether the span shares at least one token with `[start, end)`
    pub fn overlaps_range(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.overlaps_range(other.start, other.end)
    }

    /// Whether `[start, end)` lies entirely inside the span
    pub fn contains_range(&self, start: usize, end: usize) -> bool {
        self.start <= start && end <= self.end
    }
}

impl AsRef<Span> for Span {
    fn as_ref(&self) -> &Span {
        self
    }
}

/// A span promoted to an entity set, with aggregated qualifier values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub span: Span,
    #[serde(default)]
    pub qualifiers: QualifierSlots,
    /// Cue spans responsible for each aggregated value (explain mode)
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub cues: BTreeMap<QualifierKind, Vec<Span>>,
}

impl Entity {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            qualifiers: QualifierSlots::default(),
            cues: BTreeMap::new(),
        }
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn label(&self) -> &str {
        &self.span.label
    }

    /// Aggregated value of a qualifier, `None` if that qualifier never ran
    pub fn qualifier(&self, kind: QualifierKind) -> Option<bool> {
        self.qualifiers.get(kind)
    }
}

impl AsRef<Span> for Entity {
    fn as_ref(&self) -> &Span {
        &self.span
    }
}

/// Labeled region of a document, from a header to the next one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub start: usize,
    pub end: usize,
    pub label: String,
    /// The header that opened the section
    pub title: Span,
}

impl Section {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn to_span(&self) -> Span {
        Span::new(self.start, self.end, self.label.clone())
    }
}

// ============================================================================
// Document
// ============================================================================

/// A tokenized, sentence-segmented document and its annotations
///
/// Deserialization rebuilds the document through [`Document::from_parts`]
/// and re-checks every stored range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DocumentRepr")]
pub struct Document {
    id: Uuid,
    text: String,
    tokens: Vec<Token>,
    sentences: Vec<Sentence>,
    entities: Vec<Entity>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    span_groups: BTreeMap<String, Vec<Entity>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    sections: Option<Vec<Section>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    qualifier_spans: BTreeMap<QualifierKind, Vec<Span>>,
}

/// Serialized form of a [`Document`], validated on conversion
#[derive(Deserialize)]
struct DocumentRepr {
    id: Uuid,
    tokens: Vec<Token>,
    sentences: Vec<Sentence>,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    span_groups: BTreeMap<String, Vec<Entity>>,
    #[serde(default)]
    sections: Option<Vec<Section>>,
    #[serde(default)]
    qualifier_spans: BTreeMap<QualifierKind, Vec<Span>>,
}

impl TryFrom<DocumentRepr> for Document {
    type Error = ClinqualError;

    fn try_from(repr: DocumentRepr) -> Result<Self> {
        let slots: Vec<QualifierSlots> = repr.tokens.iter().map(|t| t.qualifiers).collect();
        let raw_tokens = repr
            .tokens
            .into_iter()
            .map(|t| RawToken {
                text: t.text,
                whitespace: t.whitespace,
                norm: t.norm,
                excluded: t.excluded,
            })
            .collect();
        let sentences = repr.sentences.iter().map(Sentence::range).collect();

        let mut doc = Self::from_parts(raw_tokens, sentences)?;
        doc.id = repr.id;
        for (token, qualifiers) in doc.tokens.iter_mut().zip(slots) {
            token.qualifiers = qualifiers;
        }

        for entity in repr.entities.iter().chain(repr.span_groups.values().flatten()) {
            for cue in entity.cues.values().flatten() {
                doc.check_range(cue.start, cue.end)?;
            }
        }
        doc.set_entities(repr.entities)?;
        for (name, entities) in repr.span_groups {
            for entity in &entities {
                doc.check_range(entity.start(), entity.end())?;
            }
            doc.span_groups.insert(name, entities);
        }
        if let Some(sections) = repr.sections {
            for section in &sections {
                doc.check_range(section.title.start, section.title.end)?;
            }
            doc.set_sections(sections)?;
        }
        for (kind, spans) in repr.qualifier_spans {
            for span in &spans {
                doc.check_range(span.start, span.end)?;
            }
            doc.qualifier_spans.insert(kind, spans);
        }

        Ok(doc)
    }
}

impl Document {
    /// Build a document from tokens and sentence ranges
    ///
    /// Sentences must be non-empty, in order, non-overlapping and inside
    /// the token range. Tokens outside every sentence are allowed.
    pub fn from_parts(raw_tokens: Vec<RawToken>, sentences: Vec<Range<usize>>) -> Result<Self> {
        let len = raw_tokens.len();
        let mut previous_end = 0;
        for range in &sentences {
            if range.start >= range.end || range.end > len {
                return Err(ClinqualError::InvalidDocument(format!(
                    "sentence [{}, {}) is empty or outside {} tokens",
                    range.start, range.end, len
                )));
            }
            if range.start < previous_end {
                return Err(ClinqualError::InvalidDocument(format!(
                    "sentence [{}, {}) overlaps the previous sentence",
                    range.start, range.end
                )));
            }
            previous_end = range.end;
        }

        let mut text = String::new();
        let mut tokens = Vec::with_capacity(len);
        let mut sentence_iter = sentences.iter().enumerate().peekable();

        for (index, raw) in raw_tokens.into_iter().enumerate() {
            while sentence_iter
                .peek()
                .map(|(_, range)| range.end <= index)
                .unwrap_or(false)
            {
                sentence_iter.next();
            }
            let sentence = sentence_iter
                .peek()
                .filter(|(_, range)| range.contains(&index))
                .map(|(i, _)| *i);

            let offset = text.len();
            text.push_str(&raw.text);
            text.push_str(&raw.whitespace);

            tokens.push(Token {
                index,
                text: raw.text,
                whitespace: raw.whitespace,
                norm: raw.norm,
                offset,
                sentence,
                excluded: raw.excluded,
                qualifiers: QualifierSlots::default(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            text,
            tokens,
            sentences: sentences
                .into_iter()
                .map(|r| Sentence {
                    start: r.start,
                    end: r.end,
                })
                .collect(),
            entities: Vec::new(),
            span_groups: BTreeMap::new(),
            sections: None,
            qualifier_spans: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Full text, reconstructed from tokens and their whitespace
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Sentence holding a token
    pub fn sentence_of(&self, token: usize) -> Option<&Sentence> {
        self.tokens
            .get(token)
            .and_then(|t| t.sentence)
            .and_then(|i| self.sentences.get(i))
    }

    /// Verify that `[start, end)` is a non-empty range inside the document
    pub fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start < end && end <= self.tokens.len() {
            Ok(())
        } else {
            Err(ClinqualError::InvalidSpan {
                start,
                end,
                len: self.tokens.len(),
            })
        }
    }

    /// Surface text covered by a token range
    pub fn range_text(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.tokens.len());
        if start >= end {
            return "";
        }
        let first = &self.tokens[start];
        let last = &self.tokens[end - 1];
        &self.text[first.offset..last.offset + last.text.len()]
    }

    pub fn span_text(&self, span: &Span) -> &str {
        self.range_text(span.start, span.end)
    }

    // ------------------------------------------------------------------
    // Entities and span groups
    // ------------------------------------------------------------------

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Add a span to the canonical entity set
    pub fn add_entity(&mut self, span: Span) -> Result<()> {
        self.check_range(span.start, span.end)?;
        self.entities.push(Entity::new(span));
        self.entities.sort_by_key(|e| (e.start(), e.end()));
        Ok(())
    }

    /// Replace the canonical entity set
    pub fn set_entities(&mut self, mut entities: Vec<Entity>) -> Result<()> {
        for entity in &entities {
            self.check_range(entity.start(), entity.end())?;
        }
        entities.sort_by_key(|e| (e.start(), e.end()));
        self.entities = entities;
        Ok(())
    }

    /// Spans of a named group; `"ents"` is the canonical entity set
    pub fn span_group(&self, name: &str) -> &[Entity] {
        if name == ENTS_GROUP {
            return &self.entities;
        }
        self.span_groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn span_group_names(&self) -> impl Iterator<Item = &str> {
        self.span_groups.keys().map(String::as_str)
    }

    /// Append spans to a named group
    pub fn extend_span_group(
        &mut self,
        name: &str,
        spans: impl IntoIterator<Item = Span>,
    ) -> Result<()> {
        let mut entities = Vec::new();
        for span in spans {
            self.check_range(span.start, span.end)?;
            entities.push(Entity::new(span));
        }
        if name == ENTS_GROUP {
            self.entities.extend(entities);
            self.entities.sort_by_key(|e| (e.start(), e.end()));
        } else {
            self.span_groups
                .entry(name.to_string())
                .or_default()
                .extend(entities);
        }
        Ok(())
    }

    /// Replace a named group
    pub fn set_span_group(&mut self, name: &str, spans: Vec<Span>) -> Result<()> {
        if name == ENTS_GROUP {
            return self.set_entities(spans.into_iter().map(Entity::new).collect());
        }
        self.span_groups.remove(name);
        self.extend_span_group(name, spans)
    }

    /// Entities of the requested groups, in group order
    pub fn targets<'a>(&'a self, groups: &'a [String]) -> impl Iterator<Item = &'a Entity> + 'a {
        groups.iter().flat_map(move |g| self.span_group(g).iter())
    }

    /// Apply `f` to every entity of the requested groups
    pub fn for_each_target_mut(
        &mut self,
        groups: &[String],
        mut f: impl FnMut(&mut Entity, &[Token]),
    ) {
        let tokens = &self.tokens;
        for group in groups {
            let entities = if group == ENTS_GROUP {
                Some(&mut self.entities)
            } else {
                self.span_groups.get_mut(group)
            };
            if let Some(entities) = entities {
                for entity in entities.iter_mut() {
                    f(entity, tokens);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    /// Sections, or `None` if no section detector ran on this document
    pub fn sections(&self) -> Option<&[Section]> {
        self.sections.as_deref()
    }

    /// Store the detected sections; they must be in bounds and disjoint
    pub fn set_sections(&mut self, mut sections: Vec<Section>) -> Result<()> {
        sections.sort_by_key(|s| s.start);
        let mut previous_end = 0;
        for section in &sections {
            self.check_range(section.start, section.end)?;
            if section.start < previous_end {
                return Err(ClinqualError::InvalidDocument(format!(
                    "section {:?} overlaps the previous section",
                    section.label
                )));
            }
            previous_end = section.end;
        }
        self.sections = Some(sections);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Qualifier state
    // ------------------------------------------------------------------

    /// Mark `[start, end)` as excluded from matchers running with `ignore_excluded`
    ///
    /// Meant for detectors running before any matcher (tables).
    pub fn set_excluded(&mut self, start: usize, end: usize) -> Result<()> {
        self.check_range(start, end)?;
        for token in &mut self.tokens[start..end] {
            token.excluded = true;
        }
        Ok(())
    }

    /// Write a token's qualifier slot; out-of-range indices are ignored
    pub fn set_token_qualifier(&mut self, token: usize, kind: QualifierKind, value: bool) {
        debug_assert!(token < self.tokens.len());
        if let Some(token) = self.tokens.get_mut(token) {
            token.qualifiers.set(kind, value);
        }
    }

    /// Positive scope spans registered by a qualifier
    pub fn qualifier_spans(&self, kind: QualifierKind) -> &[Span] {
        self.qualifier_spans
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_qualifier_spans(&mut self, kind: QualifierKind, spans: Vec<Span>) {
        self.qualifier_spans.insert(kind, spans);
    }
}

// ============================================================================
// Span filtering
// ============================================================================

/// Resolve overlaps, keeping longer spans first, then earlier ones
///
/// Returns `(kept, discarded)`; `kept` is sorted by start.
pub fn filter_spans<T: AsRef<Span>>(items: Vec<T>) -> (Vec<T>, Vec<T>) {
    let mut items = items;
    items.sort_by(|a, b| {
        let (a, b) = (a.as_ref(), b.as_ref());
        b.len().cmp(&a.len()).then(a.start.cmp(&b.start))
    });

    let mut kept: Vec<T> = Vec::new();
    let mut discarded = Vec::new();
    for item in items {
        let overlaps = kept.iter().any(|k| k.as_ref().overlaps(item.as_ref()));
        if overlaps {
            discarded.push(item);
        } else {
            kept.push(item);
        }
    }

    kept.sort_by_key(|k| k.as_ref().start);
    (kept, discarded)
}

// ============================================================================
// Tests
// ============================================================================
