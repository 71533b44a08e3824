//! Pattern matcher
//!
//! Regular expressions run over the attribute text of a token range; each
//! match is expanded to the smallest enclosing token range.

use std::collections::BTreeMap;
use std::ops::Range;

use regex::Regex;

use clinqual_core::{ClinqualError, Document, Result, Span, TextAttr};

/// Number of tokens exposed around each match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureWindow {
    pub before: usize,
    pub after: usize,
}

impl CaptureWindow {
    /// Window of `n` tokens following the match
    pub fn after(n: usize) -> Self {
        Self { before: 0, after: n }
    }
}

/// One regex match
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Enclosing token span, labeled with the pattern key
    pub span: Span,
    /// Capturing groups 1..n, in attribute text
    pub groups: Vec<Option<String>>,
    /// Tokens around the span (span included), clamped to the document
    pub window: Range<usize>,
}

impl PatternMatch {
    /// First capturing group, when it participated
    pub fn group(&self) -> Option<&str> {
        self.groups.first().and_then(|g| g.as_deref())
    }

    /// Window tokens after the span
    pub fn after(&self) -> Range<usize> {
        self.span.end..self.window.end.max(self.span.end)
    }
}

/// Text of a token range under an attribute, with per-token byte offsets
#[derive(Debug, Clone, Default)]
pub struct AttrText {
    pub text: String,
    /// `(byte_start, byte_end, token_index)` of every included token
    pub offsets: Vec<(usize, usize, usize)>,
}

impl AttrText {
    /// Build the text of `range`, optionally skipping excluded tokens
    pub fn build(
        doc: &Document,
        range: Range<usize>,
        attr: TextAttr,
        ignore_excluded: bool,
    ) -> Self {
        let end = range.end.min(doc.len());
        let tokens: Vec<usize> = (range.start.min(end)..end)
            .filter(|&i| !(ignore_excluded && doc.tokens()[i].is_excluded()))
            .collect();

        let mut out = Self::default();
        for (n, &i) in tokens.iter().enumerate() {
            let token = &doc.tokens()[i];
            let start = out.text.len();
            out.text.push_str(&token.attr(attr));
            out.offsets.push((start, out.text.len(), i));

            if let Some(&next) = tokens.get(n + 1) {
                if !token.whitespace().is_empty() {
                    out.text.push_str(token.whitespace());
                } else if next != i + 1 {
                    out.text.push(' ');
                }
            }
        }
        out
    }

    /// Smallest token range enclosing a byte range of the text
    pub fn token_range(&self, start: usize, end: usize) -> Option<Range<usize>> {
        let first = self.offsets.iter().find(|(_, e, _)| *e > start)?;
        let last = self.offsets.iter().rev().find(|(s, _, _)| *s < end)?;
        (first.2 <= last.2).then(|| first.2..last.2 + 1)
    }
}

/// Attribute-driven regex matcher
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    attr: TextAttr,
    ignore_excluded: bool,
    window: CaptureWindow,
    patterns: Vec<(String, Regex)>,
}

impl PatternMatcher {
    /// Create an empty matcher on an attribute
    pub fn new(attr: TextAttr) -> Self {
        Self {
            attr,
            ignore_excluded: false,
            window: CaptureWindow::default(),
            patterns: Vec::new(),
        }
    }

    /// Skip excluded tokens when matching
    pub fn with_ignore_excluded(mut self, ignore_excluded: bool) -> Self {
        self.ignore_excluded = ignore_excluded;
        self
    }

    /// Expose tokens around each match
    pub fn with_window(mut self, window: CaptureWindow) -> Self {
        self.window = window;
        self
    }

    pub fn attr(&self) -> TextAttr {
        self.attr
    }

    pub fn ignore_excluded(&self) -> bool {
        self.ignore_excluded
    }

    /// Compile every pattern of a label -> patterns mapping
    pub fn build_patterns(&mut self, regex: &BTreeMap<String, Vec<String>>) -> Result<()> {
        for (label, patterns) in regex {
            for pattern in patterns {
                self.add(label, pattern)?;
            }
        }
        Ok(())
    }

    /// Compile and add one pattern
    pub fn add(&mut self, label: &str, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|e| ClinqualError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.patterns.push((label.to_string(), regex));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Lazily match patterns inside a token range
    pub fn find_iter<'a>(
        &'a self,
        doc: &'a Document,
        range: Range<usize>,
    ) -> impl Iterator<Item = PatternMatch> + 'a {
        let text = if self.patterns.is_empty() {
            AttrText::default()
        } else {
            AttrText::build(doc, range, self.attr, self.ignore_excluded)
        };
        let len = doc.len();
        let window = self.window;

        self.patterns.iter().flat_map(move |(label, regex)| {
            regex
                .captures_iter(&text.text)
                .filter_map(|captures| {
                    let whole = captures.get(0)?;
                    if whole.start() == whole.end() {
                        return None;
                    }
                    let tokens = text.token_range(whole.start(), whole.end())?;
                    let groups = (1..captures.len())
                        .map(|i| captures.get(i).map(|g| g.as_str().to_string()))
                        .collect();
                    Some(PatternMatch {
                        span: Span::new(tokens.start, tokens.end, label.as_str()),
                        groups,
                        window: tokens.start.saturating_sub(window.before)
                            ..(tokens.end + window.after).min(len),
                    })
                })
                .collect::<Vec<_>>()
        })
    }

    /// Match the whole document, keeping spans only
    pub fn matches(&self, doc: &Document) -> Vec<Span> {
        self.find_iter(doc, 0..doc.len()).map(|m| m.span).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
