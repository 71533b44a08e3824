//! Qualifier engine
//!
//! One engine backs every qualifier kind. A pass runs in four steps:
//! match cues and terminations, resolve scopes per sentence, write the
//! token slots, then aggregate the slots onto the target entities.

use std::collections::BTreeSet;
use std::ops::Range;
use std::str::FromStr;

use tracing::debug;

use clinqual_core::{
    ConfigError, Document, QualifierConfig, QualifierKind, Result, Span, TextAttr, ENTS_GROUP,
};
use clinqual_parser::Tokenizer;

use crate::pattern::PatternMatcher;
use crate::phrase::PhraseMatcher;
use crate::scope::ScopeResolver;
use crate::{vocab, Pipe, PSEUDO_KEY, TERMINATION_KEY};

// ============================================================================
// Aggregation
// ============================================================================

/// Policy reducing token slots to one entity value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AggregationScheme {
    /// Every token must be positive
    #[default]
    All,
    /// At least one token must be positive
    Any,
}

impl AggregationScheme {
    /// Reduce token slots; unset slots count as negative
    pub fn aggregate(&self, mut values: impl Iterator<Item = Option<bool>>) -> bool {
        match self {
            Self::All => values.all(|v| v == Some(true)),
            Self::Any => values.any(|v| v == Some(true)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

impl FromStr for AggregationScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            _ => Err(ConfigError::InvalidValue {
                key: "annotation_scheme".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AggregationScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Qualifier
// ============================================================================

/// Matches of one pass, split by role
#[derive(Debug, Clone, Default)]
pub struct QualifierMatches {
    pub cues: Vec<Span>,
    pub terminations: Vec<Span>,
    pub pseudo: Vec<Span>,
}

/// Positive scope with the cues that opened it
#[derive(Debug, Clone)]
struct PositiveScope {
    span: Span,
    cues: Vec<Span>,
}

/// Rule-based contextual qualifier
#[derive(Debug, Clone)]
pub struct Qualifier {
    kind: QualifierKind,
    name: String,
    phrases: PhraseMatcher,
    patterns: PatternMatcher,
    scheme: AggregationScheme,
    /// Entity groups receiving the aggregated value
    targets: Vec<String>,
    /// Only scan sentences holding a target entity
    restrict: bool,
    explain: bool,
    section_labels: Option<Vec<String>>,
    scope: ScopeResolver,
}

impl Qualifier {
    /// Build a qualifier, validating its configuration
    pub fn new(
        kind: QualifierKind,
        config: &QualifierConfig,
        tokenizer: &Tokenizer,
    ) -> Result<Self> {
        let attr = TextAttr::from_str(&config.attr)?;
        let scheme = AggregationScheme::from_str(&config.annotation_scheme)?;

        let (targets, restrict) = match (config.on_ents_only, &config.span_getter) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict(format!(
                    "{kind}: on_ents_only and span_getter cannot be used together"
                ))
                .into())
            }
            (Some(on_ents_only), None) => (vec![ENTS_GROUP.to_string()], on_ents_only),
            (None, Some(groups)) if groups.is_empty() => (vec![ENTS_GROUP.to_string()], false),
            (None, Some(groups)) => (groups.clone(), true),
            (None, None) => (vec![ENTS_GROUP.to_string()], true),
        };

        let vocabulary = config
            .vocabulary
            .clone()
            .unwrap_or_else(|| vocab::qualifier_vocabulary(kind));
        if !vocabulary
            .keys()
            .any(|k| k != TERMINATION_KEY && k != PSEUDO_KEY)
        {
            return Err(ConfigError::MissingRequired(format!("{kind}: cue vocabulary")).into());
        }

        let mut phrases = PhraseMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
        if let Some(fuzzy) = &config.fuzzy {
            phrases = phrases.with_fuzzy(fuzzy);
        }
        phrases.build_patterns(tokenizer, &vocabulary.terms);

        let mut patterns = PatternMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
        patterns.build_patterns(&vocabulary.regex)?;

        let section_labels = config.use_sections.then(|| {
            if config.section_labels.is_empty() {
                vocab::default_section_labels(kind)
            } else {
                config.section_labels.clone()
            }
        });

        Ok(Self {
            kind,
            name: format!("qualifier:{kind}"),
            phrases,
            patterns,
            scheme,
            targets,
            restrict,
            explain: config.explain,
            section_labels,
            scope: ScopeResolver::new().with_split_on_punctuation(config.split_on_punctuation),
        })
    }

    /// Qualifier with the built-in configuration of a kind
    pub fn builtin(kind: QualifierKind, tokenizer: &Tokenizer) -> Result<Self> {
        Self::new(kind, &QualifierConfig::for_kind(kind), tokenizer)
    }

    pub fn negation(tokenizer: &Tokenizer) -> Result<Self> {
        Self::builtin(QualifierKind::Negation, tokenizer)
    }

    pub fn family(tokenizer: &Tokenizer) -> Result<Self> {
        Self::builtin(QualifierKind::Family, tokenizer)
    }

    pub fn hypothesis(tokenizer: &Tokenizer) -> Result<Self> {
        Self::builtin(QualifierKind::Hypothesis, tokenizer)
    }

    pub fn reported_speech(tokenizer: &Tokenizer) -> Result<Self> {
        Self::builtin(QualifierKind::ReportedSpeech, tokenizer)
    }

    pub fn history(tokenizer: &Tokenizer) -> Result<Self> {
        Self::builtin(QualifierKind::History, tokenizer)
    }

    pub fn kind(&self) -> QualifierKind {
        self.kind
    }

    pub fn scheme(&self) -> AggregationScheme {
        self.scheme
    }

    /// Sentences scanned by a pass
    fn sentences(&self, doc: &Document) -> Vec<Range<usize>> {
        if !self.restrict {
            return doc.sentences().iter().map(|s| s.range()).collect();
        }

        let mut wanted = BTreeSet::new();
        for entity in doc.targets(&self.targets) {
            for (i, sentence) in doc.sentences().iter().enumerate() {
                if entity.span.overlaps_range(sentence.start, sentence.end) {
                    wanted.insert(i);
                }
            }
        }
        wanted
            .into_iter()
            .map(|i| doc.sentences()[i].range())
            .collect()
    }

    /// Cue, termination and pseudo matches inside the scanned sentences
    pub fn get_matches(&self, doc: &Document) -> QualifierMatches {
        let mut matches = QualifierMatches::default();

        for sentence in self.sentences(doc) {
            let found = self
                .phrases
                .find_iter(doc, sentence.clone())
                .chain(self.patterns.find_iter(doc, sentence).map(|m| m.span));
            for span in found {
                match span.label.as_str() {
                    TERMINATION_KEY => matches.terminations.push(span),
                    PSEUDO_KEY => matches.pseudo.push(span),
                    _ => matches.cues.push(span),
                }
            }
        }

        let pseudo = &matches.pseudo;
        matches.cues.retain(|cue| !pseudo.iter().any(|p| p.overlaps(cue)));
        matches
    }

    /// Section-derived positive spans, with their titles as cues
    fn section_overrides(&self, doc: &Document) -> Vec<PositiveScope> {
        let Some(labels) = &self.section_labels else {
            return Vec::new();
        };
        let Some(sections) = doc.sections() else {
            debug!(
                qualifier = %self.kind,
                "section overrides requested but the document has no sections"
            );
            return Vec::new();
        };

        sections
            .iter()
            .filter(|s| labels.iter().any(|l| l == &s.label))
            .map(|s| PositiveScope {
                span: Span::new(s.start, s.end, self.kind.span_label()),
                cues: vec![s.title.clone()],
            })
            .collect()
    }

    /// Run one qualifier pass over a document
    pub fn process(&self, doc: &mut Document) -> Result<()> {
        let matches = self.get_matches(doc);
        let mut positives: Vec<PositiveScope> = Vec::new();
        let mut negatives: Vec<Range<usize>> = Vec::new();

        for sentence in self.sentences(doc) {
            for boundary in self.scope.boundaries(doc, sentence, &matches.terminations) {
                if self.restrict
                    && !doc
                        .targets(&self.targets)
                        .any(|e| e.span.overlaps_range(boundary.start, boundary.end))
                {
                    continue;
                }
                negatives.push(boundary.clone());

                let cues: Vec<Span> = matches
                    .cues
                    .iter()
                    .filter(|c| boundary.contains(&c.start))
                    .cloned()
                    .collect();
                if !cues.is_empty() {
                    positives.push(PositiveScope {
                        span: Span::new(boundary.start, boundary.end, self.kind.span_label()),
                        cues,
                    });
                }
            }
        }
        positives.extend(self.section_overrides(doc));

        debug!(
            qualifier = %self.kind,
            cues = matches.cues.len(),
            terminations = matches.terminations.len(),
            boundaries = negatives.len(),
            positives = positives.len(),
            "qualifier pass"
        );

        for boundary in &negatives {
            for token in boundary.clone() {
                doc.set_token_qualifier(token, self.kind, false);
            }
        }
        for positive in &positives {
            for token in positive.span.range() {
                doc.set_token_qualifier(token, self.kind, true);
            }
        }
        doc.set_qualifier_spans(
            self.kind,
            positives.iter().map(|p| p.span.clone()).collect(),
        );

        let (kind, scheme, explain) = (self.kind, self.scheme, self.explain);
        doc.for_each_target_mut(&self.targets, |entity, tokens| {
            let value = scheme.aggregate(
                tokens[entity.span.range()]
                    .iter()
                    .map(|t| t.qualifier(kind)),
            );
            entity.qualifiers.set(kind, value);

            if explain {
                let cues: Vec<Span> = positives
                    .iter()
                    .filter(|p| p.span.overlaps(&entity.span))
                    .flat_map(|p| p.cues.iter().cloned())
                    .collect();
                entity.cues.insert(kind, cues);
            }
        });

        Ok(())
    }
}

impl Pipe for Qualifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, doc: &mut Document) -> Result<()> {
        Qualifier::process(self, doc)
    }

    fn uses_sections(&self) -> bool {
        self.section_labels.is_some()
    }

    fn disable_sections(&mut self) {
        self.section_labels = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clinqual_core::{ClinqualError, Section, Vocabulary};

    fn config(vocabulary: Vocabulary) -> QualifierConfig {
        QualifierConfig {
            vocabulary: Some(vocabulary),
            ..Default::default()
        }
    }

    fn negation_vocab() -> Vocabulary {
        Vocabulary::new()
            .with_terms("negation", ["pas", "sans"])
            .with_terms(TERMINATION_KEY, ["mais"])
            .with_terms(PSEUDO_KEY, ["pas de doute"])
    }

    fn annotated(text: &str, entity: &str) -> Document {
        let mut doc = Tokenizer::new().tokenize(text).unwrap();
        let start = doc
            .tokens()
            .iter()
            .position(|t| t.text() == entity)
            .unwrap();
        doc.add_entity(Span::new(start, start + 1, "DX")).unwrap();
        doc
    }

    fn negation(config: &QualifierConfig) -> Qualifier {
        Qualifier::new(QualifierKind::Negation, config, &Tokenizer::new()).unwrap()
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("ALL".parse::<AggregationScheme>().unwrap(), AggregationScheme::All);
        assert_eq!("any".parse::<AggregationScheme>().unwrap(), AggregationScheme::Any);
        assert!("most".parse::<AggregationScheme>().is_err());
    }

    #[test]
    fn test_aggregate_treats_unset_as_negative() {
        let values = [Some(true), None];
        assert!(!AggregationScheme::All.aggregate(values.iter().copied()));
        assert!(AggregationScheme::Any.aggregate(values.iter().copied()));
        assert!(!AggregationScheme::Any.aggregate([None, Some(false)].into_iter()));
    }

    #[test]
    fn test_negated_entity() {
        let mut doc = annotated("Pas de fièvre.", "fièvre");
        negation(&config(negation_vocab())).process(&mut doc).unwrap();
        assert_eq!(doc.entities()[0].qualifier(QualifierKind::Negation), Some(true));
        assert_eq!(doc.qualifier_spans(QualifierKind::Negation).len(), 1);
        assert_eq!(doc.qualifier_spans(QualifierKind::Negation)[0].label, "NEG");
    }

    #[test]
    fn test_termination_stops_scope() {
        let mut doc = annotated("Pas de fièvre mais toux persistante.", "toux");
        negation(&config(negation_vocab())).process(&mut doc).unwrap();
        assert_eq!(doc.entities()[0].qualifier(QualifierKind::Negation), Some(false));
        // the cue's boundary holds no entity and is skipped
        assert_eq!(doc.token(0).unwrap().qualifier(QualifierKind::Negation), None);
        assert_eq!(doc.token(4).unwrap().qualifier(QualifierKind::Negation), Some(false));
    }

    #[test]
    fn test_pseudo_cancels_cue() {
        let mut doc = annotated("Il n'y a pas de doute sur la pneumopathie.", "pneumopathie");
        negation(&config(negation_vocab())).process(&mut doc).unwrap();
        assert_eq!(doc.entities()[0].qualifier(QualifierKind::Negation), Some(false));
    }

    #[test]
    fn test_restricted_mode_skips_sentences_without_entities() {
        let mut doc = annotated("Pas de toux. Fièvre.", "Fièvre");
        negation(&config(negation_vocab())).process(&mut doc).unwrap();
        assert_eq!(doc.token(0).unwrap().qualifier(QualifierKind::Negation), None);
        assert!(doc.qualifier_spans(QualifierKind::Negation).is_empty());

        let mut doc = annotated("Pas de toux. Fièvre.", "Fièvre");
        let unrestricted = QualifierConfig {
            on_ents_only: Some(false),
            ..config(negation_vocab())
        };
        negation(&unrestricted).process(&mut doc).unwrap();
        assert_eq!(doc.token(0).unwrap().qualifier(QualifierKind::Negation), Some(true));
        assert_eq!(doc.entities()[0].qualifier(QualifierKind::Negation), Some(false));
    }

    #[test]
    fn test_explain_records_cues() {
        let mut doc = annotated("Sans fièvre.", "fièvre");
        let explained = QualifierConfig {
            explain: true,
            ..config(negation_vocab())
        };
        negation(&explained).process(&mut doc).unwrap();
        let cues = &doc.entities()[0].cues[&QualifierKind::Negation];
        assert_eq!(cues.len(), 1);
        assert_eq!(doc.span_text(&cues[0]), "Sans");
    }

    #[test]
    fn test_section_override() {
        let mut doc = annotated("Antécédents : asthme", "asthme");
        doc.set_sections(vec![Section {
            start: 0,
            end: 3,
            label: "antécédents".to_string(),
            title: Span::new(0, 1, "antécédents"),
        }])
        .unwrap();

        let vocab = Vocabulary::new().with_terms("history", ["ancien"]);
        let cfg = QualifierConfig {
            use_sections: true,
            explain: true,
            ..config(vocab)
        };
        Qualifier::new(QualifierKind::History, &cfg, &Tokenizer::new())
            .unwrap()
            .process(&mut doc)
            .unwrap();

        let entity = &doc.entities()[0];
        assert_eq!(entity.qualifier(QualifierKind::History), Some(true));
        assert_eq!(entity.cues[&QualifierKind::History][0].range(), 0..1);
        assert_eq!(doc.qualifier_spans(QualifierKind::History)[0].label, "ATCD");
    }

    #[test]
    fn test_section_override_on_document_without_sections() {
        let mut doc = annotated("Antécédents : asthme", "asthme");
        assert!(doc.sections().is_none());

        let vocab = Vocabulary::new().with_terms("history", ["ancien"]);
        let cfg = QualifierConfig {
            use_sections: true,
            ..config(vocab)
        };
        Qualifier::new(QualifierKind::History, &cfg, &Tokenizer::new())
            .unwrap()
            .process(&mut doc)
            .unwrap();

        assert_eq!(doc.entities()[0].qualifier(QualifierKind::History), Some(false));
        assert!(doc.qualifier_spans(QualifierKind::History).is_empty());
    }

    #[test]
    fn test_disabled_sections_fall_back_to_cues() {
        let mut q = Qualifier::history(&Tokenizer::new()).unwrap();
        assert!(q.uses_sections());
        q.disable_sections();
        assert!(!q.uses_sections());
    }

    #[test]
    fn test_configuration_errors() {
        let tokenizer = Tokenizer::new();

        let bad_scheme = QualifierConfig {
            annotation_scheme: "majority".to_string(),
            ..config(negation_vocab())
        };
        let err = Qualifier::new(QualifierKind::Negation, &bad_scheme, &tokenizer).unwrap_err();
        assert!(matches!(err, ClinqualError::Config(ConfigError::InvalidValue { .. })));

        let conflict = QualifierConfig {
            on_ents_only: Some(true),
            span_getter: Some(vec!["ents".to_string()]),
            ..config(negation_vocab())
        };
        let err = Qualifier::new(QualifierKind::Negation, &conflict, &tokenizer).unwrap_err();
        assert!(matches!(err, ClinqualError::Config(ConfigError::Conflict(_))));

        let no_cues = config(Vocabulary::new().with_terms(TERMINATION_KEY, ["mais"]));
        let err = Qualifier::new(QualifierKind::Negation, &no_cues, &tokenizer).unwrap_err();
        assert!(matches!(err, ClinqualError::Config(ConfigError::MissingRequired(_))));

        let bad_regex = config(Vocabulary::new().with_regex("negation", ["(pas"]));
        let err = Qualifier::new(QualifierKind::Negation, &bad_regex, &tokenizer).unwrap_err();
        assert!(matches!(err, ClinqualError::InvalidPattern { .. }));

        let bad_attr = QualifierConfig {
            attr: "LEMMA".to_string(),
            ..config(negation_vocab())
        };
        assert!(Qualifier::new(QualifierKind::Negation, &bad_attr, &tokenizer).is_err());
    }

    #[test]
    fn test_empty_document() {
        let mut doc = Tokenizer::new().tokenize("").unwrap();
        let q = negation(&QualifierConfig {
            on_ents_only: Some(false),
            ..config(negation_vocab())
        });
        q.process(&mut doc).unwrap();
        assert!(doc.qualifier_spans(QualifierKind::Negation).is_empty());
    }

    #[test]
    fn test_builtin_constructors() {
        let tokenizer = Tokenizer::new();
        assert_eq!(Qualifier::negation(&tokenizer).unwrap().kind(), QualifierKind::Negation);
        assert_eq!(Qualifier::family(&tokenizer).unwrap().kind(), QualifierKind::Family);
        assert_eq!(Qualifier::hypothesis(&tokenizer).unwrap().kind(), QualifierKind::Hypothesis);
        assert_eq!(
            Qualifier::reported_speech(&tokenizer).unwrap().kind(),
            QualifierKind::ReportedSpeech
        );
        assert_eq!(Qualifier::history(&tokenizer).unwrap().name(), "qualifier:history");
    }
}
