//! Clinqual CLI - Command-line interface
//!
//! Usage:
//!   clinqual annotate <files...> [--format json|text]
//!   clinqual tokens <file>
//!   clinqual demo
//!   clinqual --config clinqual.toml annotate note.txt

mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use clinqual_core::{AppConfig, LoggingConfig, MatcherConfig, SectionsConfig, Vocabulary};
use clinqual_extractor::{vocab, Pipeline};

use crate::output::{render_text, render_tokens, DocumentView};

/// Admission note used by `clinqual demo`
const DEMO_TEXT: &str = "\
Motif :
Le patient est admis le 29 août pour des difficultés respiratoires.

Antécédents familiaux :
Le père du patient n'est pas asthmatique.

HISTOIRE DE LA MALADIE
Le patient dit avoir de la toux depuis trois jours. \
Elle a empiré jusqu'à nécessiter un passage aux urgences.

Priorité: 2 (établie par l'IAO à l'entrée)

Conclusion
Possible infection au coronavirus";

#[derive(Parser)]
#[command(name = "clinqual")]
#[command(about = "Rule-based qualification of clinical notes")]
#[command(version)]
struct Cli {
    /// TOML configuration file (built-in components when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate text files (`-` reads stdin)
    Annotate {
        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Show tokens with their qualifier labels
    Tokens {
        /// Input file
        file: PathBuf,
    },
    /// Annotate the bundled admission note
    Demo {
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Text,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);
    debug!(config = ?cli.config, "configuration loaded");

    let pipeline = Pipeline::from_config(&config).context("failed to build pipeline")?;

    match cli.command {
        Commands::Annotate { files, format } => {
            for file in &files {
                let text = clinqual_parser::read_text(file)?;
                let doc = pipeline.annotate(&text)?;
                info!(
                    file = %file.display(),
                    tokens = doc.len(),
                    entities = doc.entities().len(),
                    "annotated"
                );
                print_document(&file.display().to_string(), &doc, format)?;
            }
        }
        Commands::Tokens { file } => {
            let text = clinqual_parser::read_text(&file)?;
            let doc = pipeline.annotate(&text)?;
            print!("{}", render_tokens(&doc));
        }
        Commands::Demo { format } => {
            let doc = pipeline.annotate(DEMO_TEXT)?;
            print_document("demo", &doc, format)?;
        }
    }

    Ok(())
}

fn print_document(
    source: &str,
    doc: &clinqual_core::Document,
    format: Format,
) -> anyhow::Result<()> {
    let view = DocumentView::new(source, doc);
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        Format::Text => print!("{}", render_text(&view)),
    }
    Ok(())
}

/// Configuration file with env overrides, or the built-in setup
fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)?
            .with_env_override()
            .context("invalid environment override"),
        None => {
            let mut config = AppConfig::from_env()?;
            config.sections = Some(SectionsConfig::default());
            config.scores = vocab::builtin_scores();
            config.matcher = Some(demo_matcher());
            Ok(config)
        }
    }
}

/// Entity vocabulary of the built-in setup
fn demo_matcher() -> MatcherConfig {
    MatcherConfig {
        vocabulary: Vocabulary::new()
            .with_terms("asthme", ["asthme", "asthmatique"])
            .with_terms("toux", ["toux"])
            .with_terms("dyspnee", ["dyspnée", "difficultés respiratoires"])
            .with_regex(
                "covid",
                [r"\bcovid[- ]?19\b", r"\bcoronavirus\b", r"\bsars[- ]?cov[- ]?2\b"],
            ),
        ..Default::default()
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinqual_core::QualifierKind;
    use std::io::Write;

    #[test]
    fn test_builtin_config_runs_every_component() {
        let config = load_config(None).unwrap();
        let pipeline = Pipeline::from_config(&config).unwrap();
        let names = pipeline.pipe_names();
        assert_eq!(names[0], "matcher");
        assert_eq!(names[1], "sections");
        assert!(names.contains(&"emergency_priority"));
        assert!(names.contains(&"qualifier:history"));
    }

    #[test]
    fn test_demo_note() {
        let pipeline = Pipeline::from_config(&load_config(None).unwrap()).unwrap();
        let doc = pipeline.annotate(DEMO_TEXT).unwrap();

        let find = |label: &str| {
            doc.entities()
                .iter()
                .find(|e| e.label() == label)
                .unwrap_or_else(|| panic!("no {label} entity"))
        };

        let asthma = find("asthme");
        assert_eq!(asthma.qualifier(QualifierKind::Family), Some(true));
        assert_eq!(asthma.qualifier(QualifierKind::Negation), Some(true));

        assert_eq!(find("toux").qualifier(QualifierKind::ReportedSpeech), Some(true));
        assert_eq!(find("covid").qualifier(QualifierKind::Hypothesis), Some(true));
        assert_eq!(find("dyspnee").qualifier(QualifierKind::Negation), Some(false));
        assert_eq!(
            find("emergency_priority").span.value,
            Some(clinqual_core::NormalizedValue::Integer(2))
        );

        let labels: Vec<&str> = doc
            .sections()
            .unwrap()
            .iter()
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec!["motif", "antécédents familiaux", "histoire de la maladie", "conclusion"]
        );
    }

    #[test]
    fn test_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [qualifiers]
            disabled = ["history", "family", "hypothesis", "reported_speech"]

            [qualifiers.negation.vocabulary.terms]
            negation = ["pas"]
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert!(config.sections.is_none());
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.pipe_names(), vec!["qualifier:negation"]);
    }

    #[test]
    fn test_missing_config_file() {
        assert!(load_config(Some(Path::new("/nonexistent/clinqual.toml"))).is_err());
    }
}
