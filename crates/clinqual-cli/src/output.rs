//! Rendering of annotated documents

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use clinqual_core::{Document, NormalizedValue, QualifierKind};

/// JSON view of one entity
#[derive(Debug, Serialize)]
pub struct EntityView<'a> {
    pub start: usize,
    pub end: usize,
    pub label: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<&'a NormalizedValue>,
    /// Qualifier kind -> readable label
    pub qualifiers: BTreeMap<&'static str, &'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cues: BTreeMap<&'static str, Vec<&'a str>>,
}

/// JSON view of one section
#[derive(Debug, Serialize)]
pub struct SectionView<'a> {
    pub label: &'a str,
    pub start: usize,
    pub end: usize,
    pub title: &'a str,
}

/// JSON view of an annotated document
#[derive(Debug, Serialize)]
pub struct DocumentView<'a> {
    pub source: &'a str,
    pub tokens: usize,
    pub sentences: usize,
    pub sections: Vec<SectionView<'a>>,
    pub entities: Vec<EntityView<'a>>,
}

impl<'a> DocumentView<'a> {
    pub fn new(source: &'a str, doc: &'a Document) -> Self {
        let sections = doc
            .sections()
            .unwrap_or(&[])
            .iter()
            .map(|s| SectionView {
                label: &s.label,
                start: s.start,
                end: s.end,
                title: doc.span_text(&s.title),
            })
            .collect();

        let entities = doc
            .entities()
            .iter()
            .map(|e| EntityView {
                start: e.start(),
                end: e.end(),
                label: e.label(),
                text: doc.span_text(&e.span),
                value: e.span.value.as_ref(),
                qualifiers: QualifierKind::ALL
                    .iter()
                    .map(|kind| (kind.as_str(), kind.label(e.qualifier(*kind))))
                    .collect(),
                cues: e
                    .cues
                    .iter()
                    .map(|(kind, spans)| {
                        (kind.as_str(), spans.iter().map(|s| doc.span_text(s)).collect())
                    })
                    .collect(),
            })
            .collect();

        Self {
            source,
            tokens: doc.len(),
            sentences: doc.sentences().len(),
            sections,
            entities,
        }
    }
}

/// Plain-text rendering of a document view
pub fn render_text(view: &DocumentView<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== {} ({} tokens, {} sentences) ==",
        view.source, view.tokens, view.sentences
    );

    if !view.sections.is_empty() {
        let _ = writeln!(out, "sections:");
        for s in &view.sections {
            let _ = writeln!(out, "  {:<24} [{}..{}) {:?}", s.label, s.start, s.end, s.title);
        }
    }

    let _ = writeln!(out, "entities:");
    if view.entities.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for e in &view.entities {
        let _ = write!(out, "  {:<12} [{}..{}) {:?}", e.label, e.start, e.end, e.text);
        if let Some(value) = e.value {
            let _ = write!(out, " = {value}");
        }
        for (kind, label) in &e.qualifiers {
            let _ = write!(out, " {kind}={label}");
        }
        let _ = writeln!(out);
        for (kind, cues) in &e.cues {
            let _ = writeln!(out, "      {kind} cues: {}", cues.join(", "));
        }
    }
    out
}

/// Token table with tri-state qualifier labels
pub fn render_tokens(doc: &Document) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:>5} {:<20} {:>4}", "idx", "token", "sent");
    for kind in QualifierKind::ALL {
        let _ = write!(out, " {:<16}", kind.as_str());
    }
    let _ = writeln!(out);

    for token in doc.tokens() {
        let sentence = token
            .sentence()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let text = if token.is_excluded() {
            format!("({})", token.text())
        } else {
            token.text().to_string()
        };
        let _ = write!(out, "{:>5} {:<20} {:>4}", token.index(), text, sentence);
        for kind in QualifierKind::ALL {
            let _ = write!(out, " {:<16}", kind.label(token.qualifier(kind)));
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinqual_core::Span;
    use clinqual_parser::Tokenizer;

    fn annotated() -> Document {
        let mut doc = Tokenizer::new().tokenize("Pas de fièvre.").unwrap();
        doc.add_entity(Span::new(2, 3, "fievre")).unwrap();
        doc.set_token_qualifier(2, QualifierKind::Negation, true);
        doc
    }

    #[test]
    fn test_document_view_labels() {
        let doc = annotated();
        let view = DocumentView::new("note.txt", &doc);
        assert_eq!(view.entities.len(), 1);
        assert_eq!(view.entities[0].text, "fièvre");
        assert_eq!(view.entities[0].qualifiers["negation"], "NOTSET");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["entities"][0]["label"], "fievre");
        assert_eq!(json["sections"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_render_text() {
        let doc = annotated();
        let text = render_text(&DocumentView::new("note.txt", &doc));
        assert!(text.starts_with("== note.txt (4 tokens, 1 sentences) =="));
        assert!(text.contains("fievre"));
        assert!(text.contains("negation=NOTSET"));
    }

    #[test]
    fn test_render_tokens() {
        let table = render_tokens(&annotated());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].contains("NEG"));
        assert!(lines[1].contains("NOTSET"));
    }
}
