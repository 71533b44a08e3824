//! Phrase matcher
//!
//! Dictionary lookup of tokenized phrases against one token attribute.
//! Every occurrence of every phrase is reported, overlapping ones included.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use clinqual_core::{Document, FuzzyConfig, RawToken, Span, TextAttr};
use clinqual_parser::{normalize, Tokenizer};

/// Phrase tokens in attribute form
#[derive(Debug, Clone)]
struct PhrasePattern {
    label: String,
    tokens: Vec<String>,
}

#[derive(Debug, Clone)]
struct Fuzzy {
    max_distance: usize,
    min_token_len: usize,
    eligible: Option<HashSet<String>>,
}

/// Token-sequence dictionary matcher
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    attr: TextAttr,
    ignore_excluded: bool,
    fuzzy: Option<Fuzzy>,
    patterns: Vec<PhrasePattern>,
    /// First token -> pattern indices (exact lookup)
    index: HashMap<String, Vec<usize>>,
}

impl PhraseMatcher {
    /// Create an empty matcher on an attribute
    pub fn new(attr: TextAttr) -> Self {
        Self {
            attr,
            ignore_excluded: false,
            fuzzy: None,
            patterns: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Skip excluded tokens when matching
    pub fn with_ignore_excluded(mut self, ignore_excluded: bool) -> Self {
        self.ignore_excluded = ignore_excluded;
        self
    }

    /// Allow bounded edit-distance matches on phrase tokens
    pub fn with_fuzzy(mut self, config: &FuzzyConfig) -> Self {
        let attr = self.attr;
        self.fuzzy = Some(Fuzzy {
            max_distance: config.max_distance,
            min_token_len: config.min_token_len,
            eligible: config
                .eligible_tokens
                .as_ref()
                .map(|tokens| tokens.iter().map(|t| attr_form(t, attr)).collect()),
        });
        self
    }

    pub fn attr(&self) -> TextAttr {
        self.attr
    }

    /// Tokenize and add every phrase of a label -> phrases mapping
    pub fn build_patterns(&mut self, tokenizer: &Tokenizer, terms: &BTreeMap<String, Vec<String>>) {
        for (label, phrases) in terms {
            for phrase in phrases {
                let tokens = tokenizer.words(phrase);
                if tokens.is_empty() {
                    tracing::warn!(label = %label, "skipping empty phrase");
                    continue;
                }
                self.add(label, &tokens);
            }
        }
    }

    /// Add one tokenized phrase
    pub fn add(&mut self, label: &str, tokens: &[RawToken]) {
        let tokens: Vec<String> = tokens.iter().map(|t| attr_form(&t.text, self.attr)).collect();
        let Some(first) = tokens.first().cloned() else {
            return;
        };

        self.index.entry(first).or_default().push(self.patterns.len());
        self.patterns.push(PhrasePattern {
            label: label.to_string(),
            tokens,
        });
    }

    /// Number of phrases
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Lazily match phrases inside a token range
    pub fn find_iter<'a>(
        &'a self,
        doc: &'a Document,
        range: Range<usize>,
    ) -> impl Iterator<Item = Span> + 'a {
        let end = range.end.min(doc.len());
        let visible: Vec<usize> = (range.start.min(end)..end)
            .filter(|&i| !(self.ignore_excluded && doc.tokens()[i].is_excluded()))
            .collect();
        let keys: Vec<String> = visible
            .iter()
            .map(|&i| doc.tokens()[i].attr(self.attr).into_owned())
            .collect();

        (0..visible.len()).flat_map(move |position| self.matches_at(&visible, &keys, position))
    }

    /// Match the whole document
    pub fn matches(&self, doc: &Document) -> Vec<Span> {
        self.find_iter(doc, 0..doc.len()).collect()
    }

    fn matches_at(&self, visible: &[usize], keys: &[String], position: usize) -> Vec<Span> {
        let candidates: Box<dyn Iterator<Item = usize> + '_> = match &self.fuzzy {
            None => match self.index.get(&keys[position]) {
                Some(ids) => Box::new(ids.iter().copied()),
                None => return Vec::new(),
            },
            Some(_) => Box::new(0..self.patterns.len()),
        };

        candidates
            .filter_map(|id| {
                let pattern = &self.patterns[id];
                let end = position + pattern.tokens.len();
                if end > keys.len() {
                    return None;
                }
                let matched = pattern
                    .tokens
                    .iter()
                    .zip(&keys[position..end])
                    .all(|(expected, actual)| self.token_matches(expected, actual));

                matched.then(|| Span::new(visible[position], visible[end - 1] + 1, &pattern.label))
            })
            .collect()
    }

    fn token_matches(&self, expected: &str, actual: &str) -> bool {
        if expected == actual {
            return true;
        }
        let Some(fuzzy) = &self.fuzzy else {
            return false;
        };
        if expected.chars().count() < fuzzy.min_token_len {
            return false;
        }
        if let Some(eligible) = &fuzzy.eligible {
            if !eligible.contains(expected) {
                return false;
            }
        }
        levenshtein(expected, actual) <= fuzzy.max_distance
    }
}

/// Text of `text` under an attribute
pub(crate) fn attr_form(text: &str, attr: TextAttr) -> String {
    match attr {
        TextAttr::Text => text.to_string(),
        TextAttr::Lower => text.to_lowercase(),
        TextAttr::Norm => normalize(text),
    }
}

/// Levenshtein distance over chars
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn matcher(attr: TextAttr, pairs: &[(&str, &[&str])]) -> PhraseMatcher {
        let mut m = PhraseMatcher::new(attr);
        m.build_patterns(&Tokenizer::new(), &terms(pairs));
        m
    }

    fn found(doc: &Document, spans: &[Span]) -> Vec<(String, String)> {
        spans
            .iter()
            .map(|s| (s.label.clone(), doc.span_text(s).to_string()))
            .collect()
    }

    #[test]
    fn test_multi_token_phrase() {
        let doc = Tokenizer::new()
            .tokenize("Le père du patient n'est pas asthmatique.")
            .unwrap();
        let m = matcher(TextAttr::Norm, &[("negation", &["n'est pas"]), ("family", &["pere"])]);

        let spans = m.matches(&doc);
        assert_eq!(
            found(&doc, &spans),
            vec![
                ("family".to_string(), "père".to_string()),
                ("negation".to_string(), "n'est pas".to_string()),
            ]
        );
    }

    #[test]
    fn test_case_sensitivity_follows_attr() {
        let doc = Tokenizer::new().tokenize("Pas de fièvre").unwrap();

        assert!(matcher(TextAttr::Text, &[("neg", &["pas"])]).matches(&doc).is_empty());
        assert_eq!(matcher(TextAttr::Lower, &[("neg", &["pas"])]).matches(&doc).len(), 1);
        assert!(matcher(TextAttr::Lower, &[("x", &["fievre"])]).matches(&doc).is_empty());
        assert_eq!(matcher(TextAttr::Norm, &[("x", &["fièvre"])]).matches(&doc).len(), 1);
    }

    #[test]
    fn test_overlapping_phrases_all_reported() {
        let doc = Tokenizer::new().tokenize("antécédents familiaux").unwrap();
        let m = matcher(
            TextAttr::Norm,
            &[("a", &["antécédents"]), ("b", &["antécédents familiaux"])],
        );
        let spans = m.matches(&doc);
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().any(|s| s.range() == (0..1)));
        assert!(spans.iter().any(|s| s.range() == (0..2)));
    }

    #[test]
    fn test_find_iter_restricted_to_range() {
        let doc = Tokenizer::new().tokenize("pas ici. pas là.").unwrap();
        let m = matcher(TextAttr::Norm, &[("neg", &["pas"])]);
        let second = doc.sentences()[1].range();
        let spans: Vec<Span> = m.find_iter(&doc, second.clone()).collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, second.start);
    }

    #[test]
    fn test_ignore_excluded_skips_tokens() {
        let tokenizer = Tokenizer::with_config(clinqual_core::TokenizerConfig {
            exclusion_patterns: vec![r"\[[^\]]*\]".to_string()],
            ..Default::default()
        })
        .unwrap();
        let doc = tokenizer.tokenize("absence [sic] de fièvre").unwrap();

        let mut strict = PhraseMatcher::new(TextAttr::Norm);
        strict.build_patterns(&tokenizer, &terms(&[("neg", &["absence de"])]));
        assert!(strict.matches(&doc).is_empty());

        let lenient = strict.clone().with_ignore_excluded(true);
        let spans = lenient.matches(&doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(doc.span_text(&spans[0]), "absence [sic] de");
    }

    #[test]
    fn test_fuzzy_matching() {
        let doc = Tokenizer::new().tokenize("patient asthmatqiue").unwrap();
        let exact = matcher(TextAttr::Norm, &[("dx", &["asthmatique"])]);
        assert!(exact.matches(&doc).is_empty());

        let fuzzy = exact.clone().with_fuzzy(&FuzzyConfig {
            max_distance: 2,
            ..Default::default()
        });
        assert_eq!(fuzzy.matches(&doc).len(), 1);

        let restricted = exact.with_fuzzy(&FuzzyConfig {
            max_distance: 2,
            eligible_tokens: Some(vec!["diabète".to_string()]),
            ..Default::default()
        });
        assert!(restricted.matches(&doc).is_empty());
    }

    #[test]
    fn test_fuzzy_skips_short_tokens() {
        let doc = Tokenizer::new().tokenize("pis").unwrap();
        let m = matcher(TextAttr::Norm, &[("neg", &["pas"])]).with_fuzzy(&FuzzyConfig::default());
        assert!(m.matches(&doc).is_empty());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("père", "pere"), 1);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
