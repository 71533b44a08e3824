//! Scope resolver
//!
//! Splits a sentence into boundary ranges at termination starts (and,
//! optionally, after clause punctuation). A cue acts on the boundary range
//! holding its first token.

use std::ops::Range;

use clinqual_core::{Document, Span};

/// Tokens after which a new boundary starts when punctuation splitting is on
const CLAUSE_PUNCT: &[&str] = &[",", ";", ":"];

/// Computes the token ranges over which cues apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeResolver {
    split_on_punctuation: bool,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also split scopes after non-excluded `,` `;` `:` tokens
    pub fn with_split_on_punctuation(mut self, split: bool) -> Self {
        self.split_on_punctuation = split;
        self
    }

    /// Boundary ranges partitioning `sentence`
    ///
    /// Terminations outside the sentence are ignored. The returned ranges
    /// are ordered, non-empty and cover the sentence exactly.
    pub fn boundaries(
        &self,
        doc: &Document,
        sentence: Range<usize>,
        terminations: &[Span],
    ) -> Vec<Range<usize>> {
        let sentence = sentence.start..sentence.end.min(doc.len());
        if sentence.is_empty() {
            return Vec::new();
        }

        let mut starts: Vec<usize> = vec![sentence.start];
        starts.extend(
            terminations
                .iter()
                .map(|t| t.start)
                .filter(|s| sentence.contains(s)),
        );
        if self.split_on_punctuation {
            starts.extend(
                doc.tokens()[sentence.clone()]
                    .iter()
                    .filter(|t| !t.is_excluded() && CLAUSE_PUNCT.contains(&t.text()))
                    .map(|t| t.index() + 1)
                    .filter(|s| *s < sentence.end),
            );
        }
        starts.sort_unstable();
        starts.dedup();

        let mut ends: Vec<usize> = starts[1..].to_vec();
        ends.push(sentence.end);

        starts.into_iter().zip(ends).map(|(s, e)| s..e).collect()
    }

    /// The boundary holding the cue's first token
    pub fn scope_of(boundaries: &[Range<usize>], cue: &Span) -> Option<Range<usize>> {
        boundaries.iter().find(|b| b.contains(&cue.start)).cloned()
    }

    /// Scope of every cue inside `sentence`; cues starting elsewhere are skipped
    pub fn scopes(
        &self,
        doc: &Document,
        sentence: Range<usize>,
        cues: &[Span],
        terminations: &[Span],
    ) -> Vec<(Span, Range<usize>)> {
        let boundaries = self.boundaries(doc, sentence, terminations);
        cues.iter()
            .filter_map(|cue| Self::scope_of(&boundaries, cue).map(|scope| (cue.clone(), scope)))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
