//! Table detector
//!
//! A table is a run of consecutive lines that each hold a cell separator
//! token (`|`, `¦`). A blank line ends the run. Table tokens are stored in
//! the `tables` span group and marked excluded, so matchers and qualifiers
//! running with `ignore_excluded` skip them. Run it before any matcher.

use std::ops::Range;
use std::str::FromStr;

use regex::Regex;
use tracing::debug;

use clinqual_core::{
    filter_spans, ClinqualError, ConfigError, Document, Result, Span, TablesConfig, TextAttr,
};

use crate::pattern::PatternMatcher;
use crate::Pipe;

/// Span group holding detected tables
pub const TABLES_GROUP: &str = "tables";

const TABLE_LABEL: &str = "table";

/// Line-structured table detection
#[derive(Debug, Clone)]
pub struct TableDetector {
    separators: Vec<Regex>,
    pattern: Option<PatternMatcher>,
    min_rows: usize,
    ignore_excluded: bool,
}

impl TableDetector {
    pub fn new(config: &TablesConfig) -> Result<Self> {
        if config.sep_pattern.is_empty() && config.tables_pattern.is_none() {
            return Err(ConfigError::MissingRequired("tables.sep_pattern".to_string()).into());
        }

        let separators = config
            .sep_pattern
            .iter()
            .map(|sep| {
                Regex::new(&format!("^(?:{sep})$")).map_err(|e| ClinqualError::InvalidPattern {
                    pattern: sep.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pattern = match &config.tables_pattern {
            Some(tables_pattern) => {
                let attr = TextAttr::from_str(&config.attr)?;
                let mut matcher =
                    PatternMatcher::new(attr).with_ignore_excluded(config.ignore_excluded);
                matcher.add(TABLE_LABEL, tables_pattern)?;
                Some(matcher)
            }
            None => None,
        };

        Ok(Self {
            separators,
            pattern,
            min_rows: config.min_rows.max(1),
            ignore_excluded: config.ignore_excluded,
        })
    }

    /// Detector splitting cells on `|` and `¦`
    pub fn builtin() -> Result<Self> {
        Self::new(&TablesConfig::default())
    }

    /// Table spans, ordered and disjoint
    pub fn tables(&self, doc: &Document) -> Vec<Span> {
        let mut tables = match &self.pattern {
            Some(pattern) => filter_spans(pattern.matches(doc)).0,
            None => self.line_tables(doc),
        };
        tables.sort_by_key(|t| t.start);
        tables
    }

    fn line_tables(&self, doc: &Document) -> Vec<Span> {
        let mut tables = Vec::new();
        // (first token, end token, rows)
        let mut run: Option<(usize, usize, usize)> = None;

        for line in lines(doc) {
            if self.is_row(doc, line.clone()) {
                run = Some(match run {
                    Some((start, _, rows)) => (start, line.end, rows + 1),
                    None => (line.start, line.end, 1),
                });
            } else {
                self.close(run.take(), &mut tables);
            }

            if ends_paragraph(doc, line.end) {
                self.close(run.take(), &mut tables);
            }
        }
        self.close(run, &mut tables);

        tables
    }

    fn close(&self, run: Option<(usize, usize, usize)>, tables: &mut Vec<Span>) {
        if let Some((start, end, rows)) = run {
            if rows >= self.min_rows {
                tables.push(Span::new(start, end, TABLE_LABEL));
            }
        }
    }

    fn is_row(&self, doc: &Document, line: Range<usize>) -> bool {
        doc.tokens()[line]
            .iter()
            .filter(|t| !(self.ignore_excluded && t.is_excluded()))
            .any(|t| self.separators.iter().any(|re| re.is_match(t.text())))
    }

    pub fn process(&self, doc: &mut Document) -> Result<()> {
        let tables = self.tables(doc);
        debug!(tables = tables.len(), "detected tables");

        for table in &tables {
            doc.set_excluded(table.start, table.end)?;
        }
        doc.set_span_group(TABLES_GROUP, tables)
    }
}

impl Pipe for TableDetector {
    fn name(&self) -> &str {
        "tables"
    }

    fn process(&self, doc: &mut Document) -> Result<()> {
        TableDetector::process(self, doc)
    }
}

/// Token ranges of the document lines, blank lines omitted
fn lines(doc: &Document) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, token) in doc.tokens().iter().enumerate() {
        if token.ends_line() || i + 1 == doc.len() {
            out.push(start..i + 1);
            start = i + 1;
        }
    }
    out
}

/// Whether a blank line follows the line ending before `end`
fn ends_paragraph(doc: &Document, end: usize) -> bool {
    end > 0 && doc.tokens()[end - 1].whitespace().matches('\n').count() > 1
}

// ============================================================================
// Tests
// ============================================================================
