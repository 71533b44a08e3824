//! Clinqual Extractor - Rule-based span matching and scope qualification
//!
//! Locates cue terms with dictionary and pattern matchers, bounds each
//! cue's influence with termination markers and sentence limits, and
//! aggregates token-level qualifier values onto entities. The same engine
//! backs every qualifier (negation, family, hypothesis, reported speech,
//! history) and the structural detectors (tables, sections, scores).

pub mod matcher;
pub mod pattern;
pub mod phrase;
pub mod pipeline;
pub mod qualifier;
pub mod scope;
pub mod score;
pub mod sections;
pub mod tables;
pub mod vocab;

pub use matcher::EntityMatcher;
pub use pattern::{AttrText, CaptureWindow, PatternMatch, PatternMatcher};
pub use phrase::PhraseMatcher;
pub use pipeline::{Pipeline, PipelineError};
pub use qualifier::{AggregationScheme, Qualifier, QualifierMatches};
pub use scope::ScopeResolver;
pub use score::{NormalizeFn, Normalizer, ScoreExtractor};
pub use sections::{SectionDetector, SECTIONS_GROUP, SECTION_TITLES_GROUP};
pub use tables::{TableDetector, TABLES_GROUP};

use clinqual_core::{filter_spans, Document, Entity, Result, Span};

/// Vocabulary key whose matches end a cue's scope
pub const TERMINATION_KEY: &str = "termination";

/// Vocabulary key whose matches cancel the cues they overlap
pub const PSEUDO_KEY: &str = "pseudo";

/// Span group holding spans that lost an overlap resolution
pub const DISCARDED_GROUP: &str = "discarded";

/// A component applied to documents, in pipeline order
pub trait Pipe: Send + Sync {
    /// Component name, for logging
    fn name(&self) -> &str;

    /// Annotate a document in place
    fn process(&self, doc: &mut Document) -> Result<()>;

    /// Whether this component fills `Document::sections`
    fn provides_sections(&self) -> bool {
        false
    }

    /// Whether this component reads `Document::sections`
    fn uses_sections(&self) -> bool {
        false
    }

    /// Stop reading sections (no section provider upstream)
    fn disable_sections(&mut self) {}
}

/// Merge new spans into the entity set; overlap losers go to `discarded`
pub(crate) fn merge_entities(doc: &mut Document, spans: Vec<Span>) -> Result<()> {
    if spans.is_empty() {
        return Ok(());
    }
    let candidates: Vec<Entity> = doc
        .entities()
        .iter()
        .cloned()
        .chain(spans.into_iter().map(Entity::new))
        .collect();
    let (kept, discarded) = filter_spans(candidates);

    doc.set_entities(kept)?;
    doc.extend_span_group(DISCARDED_GROUP, discarded.into_iter().map(|e| e.span))
}
