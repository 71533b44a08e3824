//! Ordered composition of pipes
//!
//! A [`Pipeline`] owns a tokenizer and a list of pipes applied in order.
//! Pipes reading sections are checked against the pipes added before them.

use thiserror::Error;
use tracing::{info, warn};

use clinqual_core::{AppConfig, ClinqualError, Document};
use clinqual_parser::{ParserError, Tokenizer};

use crate::{EntityMatcher, Pipe, Qualifier, ScoreExtractor, SectionDetector, TableDetector};

/// Errors raised while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] ClinqualError),

    #[error(transparent)]
    Parser(#[from] ParserError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Tokenizer plus ordered pipes
pub struct Pipeline {
    tokenizer: Tokenizer,
    pipes: Vec<Box<dyn Pipe>>,
}

impl Pipeline {
    /// Empty pipeline around a tokenizer
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            pipes: Vec::new(),
        }
    }

    /// Build every configured component, in order: tables, matcher,
    /// sections, scores, qualifiers
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let tokenizer = Tokenizer::with_config(config.tokenizer.clone())?;
        let mut pipeline = Self::new(tokenizer);

        if let Some(tables) = &config.tables {
            pipeline.add_pipe(Box::new(TableDetector::new(tables)?));
        }
        if let Some(matcher) = &config.matcher {
            let pipe = EntityMatcher::new(matcher, &pipeline.tokenizer)?;
            pipeline.add_pipe(Box::new(pipe));
        }
        if let Some(sections) = &config.sections {
            let pipe = SectionDetector::new(sections, &pipeline.tokenizer)?;
            pipeline.add_pipe(Box::new(pipe));
        }
        for (name, score) in &config.scores {
            pipeline.add_pipe(Box::new(ScoreExtractor::new(name, score)?));
        }
        for (kind, qualifier) in config.qualifiers.enabled() {
            let pipe = Qualifier::new(kind, qualifier, &pipeline.tokenizer)?;
            pipeline.add_pipe(Box::new(pipe));
        }

        info!(pipes = ?pipeline.pipe_names(), "pipeline ready");
        Ok(pipeline)
    }

    /// Append a pipe
    ///
    /// A pipe reading sections with no section provider before it is
    /// kept, with its section overrides disabled.
    pub fn add_pipe(&mut self, mut pipe: Box<dyn Pipe>) {
        if pipe.uses_sections() && !self.pipes.iter().any(|p| p.provides_sections()) {
            warn!(
                pipe = pipe.name(),
                "section overrides requested but no section detector runs before; skipping them"
            );
            pipe.disable_sections();
        }
        self.pipes.push(pipe);
    }

    /// Builder form of [`Pipeline::add_pipe`]
    pub fn with_pipe(mut self, pipe: impl Pipe + 'static) -> Self {
        self.add_pipe(Box::new(pipe));
        self
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn pipe_names(&self) -> Vec<&str> {
        self.pipes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Apply every pipe to a document
    pub fn process(&self, doc: &mut Document) -> Result<()> {
        for pipe in &self.pipes {
            pipe.process(doc)?;
        }
        Ok(())
    }

    /// Tokenize a text and run the pipeline on it
    pub fn annotate(&self, text: &str) -> Result<Document> {
        let mut doc = self.tokenizer.tokenize(text)?;
        self.process(&mut doc)?;
        Ok(doc)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("tokenizer", &self.tokenizer)
            .field("pipes", &self.pipe_names())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clinqual_core::{
        MatcherConfig, QualifierKind, ScoreConfig, SectionsConfig, Span, TablesConfig,
        Vocabulary,
    };

    fn config() -> AppConfig {
        let mut config = AppConfig {
            matcher: Some(MatcherConfig {
                vocabulary: Vocabulary::new().with_terms("asthme", ["asthmatique"]),
                ..Default::default()
            }),
            sections: Some(SectionsConfig::default()),
            ..Default::default()
        };
        config.scores.insert(
            "priority".to_string(),
            ScoreConfig {
                regex: vec![r"Priorité:\s*(\d)".to_string()],
                valid_range: Some([0.0, 5.0]),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn test_from_config_order() {
        let pipeline = Pipeline::from_config(&config()).unwrap();
        assert_eq!(
            pipeline.pipe_names(),
            vec![
                "matcher",
                "sections",
                "priority",
                "qualifier:negation",
                "qualifier:family",
                "qualifier:hypothesis",
                "qualifier:reported_speech",
                "qualifier:history",
            ]
        );
    }

    #[test]
    fn test_annotate() {
        let pipeline = Pipeline::from_config(&config()).unwrap();
        let doc = pipeline
            .annotate("Antécédents familiaux :\nLe père du patient n'est pas asthmatique.")
            .unwrap();

        let entity = &doc.entities()[0];
        assert_eq!(entity.label(), "asthme");
        assert_eq!(entity.qualifier(QualifierKind::Negation), Some(true));
        assert_eq!(entity.qualifier(QualifierKind::Family), Some(true));
        assert_eq!(entity.qualifier(QualifierKind::Hypothesis), Some(false));
    }

    #[test]
    fn test_sections_keep_matcher_and_score_entities() {
        let mut config = config();
        if let Some(sections) = config.sections.as_mut() {
            sections.add_entities = true;
        }
        let pipeline = Pipeline::from_config(&config).unwrap();
        let doc = pipeline
            .annotate("Antécédents familiaux :\nLe père n'est pas asthmatique.\nPriorité: 2")
            .unwrap();

        let labels: Vec<&str> = doc.entities().iter().map(|e| e.label()).collect();
        assert_eq!(labels, vec!["asthme", "priority"]);
        assert!(doc.span_group(crate::DISCARDED_GROUP).is_empty());

        let sections = doc.span_group(crate::SECTIONS_GROUP);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label(), "antécédents familiaux");

        assert_eq!(doc.entities()[0].qualifier(QualifierKind::Family), Some(true));
        assert_eq!(doc.entities()[0].qualifier(QualifierKind::Negation), Some(true));
    }

    #[test]
    fn test_tables_run_first() {
        let mut config = config();
        config.tables = Some(TablesConfig::default());
        if let Some(matcher) = config.matcher.as_mut() {
            matcher.ignore_excluded = true;
        }
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.pipe_names()[..2], ["tables", "matcher"]);

        let doc = pipeline
            .annotate("Bilan :\nasthmatique | oui\ntoux | non\nMère asthmatique.")
            .unwrap();
        assert_eq!(doc.span_group(crate::TABLES_GROUP).len(), 1);
        assert_eq!(doc.entities().len(), 1);
        assert_eq!(doc.span_text(&doc.entities()[0].span), "asthmatique");
        assert!(doc.entities()[0].start() >= doc.span_group(crate::TABLES_GROUP)[0].end());
    }

    #[test]
    fn test_missing_section_provider_disables_overrides() {
        let tokenizer = Tokenizer::new();
        let history = Qualifier::history(&tokenizer).unwrap();
        let pipeline = Pipeline::new(tokenizer).with_pipe(history);

        let mut doc = pipeline.tokenizer().tokenize("Antécédents :\nasthme").unwrap();
        doc.add_entity(Span::new(2, 3, "asthme")).unwrap();
        pipeline.process(&mut doc).unwrap();

        assert!(doc.sections().is_none());
        assert_eq!(doc.entities()[0].qualifier(QualifierKind::History), Some(false));
    }

    #[test]
    fn test_section_provider_enables_overrides() {
        let tokenizer = Tokenizer::new();
        let sections = SectionDetector::builtin(&tokenizer).unwrap();
        let history = Qualifier::history(&tokenizer).unwrap();
        let pipeline = Pipeline::new(tokenizer).with_pipe(sections).with_pipe(history);

        let mut doc = pipeline.tokenizer().tokenize("Antécédents :\nasthme").unwrap();
        doc.add_entity(Span::new(2, 3, "asthme")).unwrap();
        pipeline.process(&mut doc).unwrap();

        assert_eq!(doc.entities()[0].qualifier(QualifierKind::History), Some(true));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = AppConfig::default();
        if let Some(negation) = config.qualifiers.negation.as_mut() {
            negation.annotation_scheme = "most".to_string();
        }
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(PipelineError::Core(ClinqualError::Config(_)))
        ));

        let mut config = AppConfig::default();
        config.tokenizer.exclusion_patterns.push("(".to_string());
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(PipelineError::Parser(_))
        ));
    }
}
