//! Built-in French vocabularies
//!
//! Cue lists for each qualifier kind, section headers and score
//! definitions. Terms are written with accents; matching on the NORM
//! attribute folds them.

use std::collections::BTreeMap;

use clinqual_core::{QualifierKind, ScoreConfig, ScoreNormalization, Vocabulary};

use crate::{PSEUDO_KEY, TERMINATION_KEY};

/// Scope-ending terms shared by every qualifier
const TERMINATION: &[&str] = &[
    "mais",
    "cependant",
    "néanmoins",
    "pourtant",
    "toutefois",
    "par contre",
    "en revanche",
    "alors que",
    "tandis que",
    "hormis",
    "sauf",
    "excepté",
    "à part",
    "donc",
    "car",
    "puis",
    "avec",
    "et de",
];

const NEGATION: &[&str] = &[
    "pas",
    "ne pas",
    "ni",
    "non",
    "sans",
    "aucun",
    "aucune",
    "absence",
    "absence de",
    "absent",
    "absente",
    "négatif",
    "négative",
    "jamais",
    "exclu",
    "exclue",
    "élimine",
    "éliminé",
    "infirmé",
    "infirme",
    "disparition",
    "résolu",
    "résolue",
    "normal",
    "normale",
];

const NEGATION_PSEUDO: &[&str] = &[
    "pas de doute",
    "sans doute",
    "sans amélioration",
    "sans changement",
    "pas seulement",
    "pas que",
    "non seulement",
    "ne pas exclure",
    "pas exclu",
    "pas éliminé",
    "n'exclut pas",
    "ne peut être exclu",
    "ne peut être éliminé",
    "pas certain",
    "pas sûr",
];

const FAMILY: &[&str] = &[
    "famille",
    "familial",
    "familiale",
    "familiaux",
    "père",
    "papa",
    "mère",
    "maman",
    "frère",
    "frères",
    "sœur",
    "sœurs",
    "parent",
    "parents",
    "grand-père",
    "grand-mère",
    "grands-parents",
    "oncle",
    "tante",
    "cousin",
    "cousine",
    "fils",
    "fille",
    "enfant",
    "enfants",
    "mari",
    "épouse",
    "conjoint",
    "conjointe",
];

const FAMILY_PSEUDO: &[&str] = &["famille d'accueil", "médecin de famille", "fille de salle"];

const HYPOTHESIS: &[&str] = &[
    "possible",
    "possiblement",
    "probable",
    "probablement",
    "éventuel",
    "éventuelle",
    "éventuellement",
    "suspicion",
    "suspicion de",
    "suspect",
    "suspecté",
    "suspectée",
    "hypothèse",
    "hypothèse de",
    "évoque",
    "évoquer",
    "évocateur",
    "évocatrice",
    "compatible avec",
    "en faveur de",
    "pourrait",
    "peut-être",
    "semble",
    "semblerait",
    "douteux",
    "incertain",
    "à confirmer",
    "à éliminer",
    "à discuter",
    "à rechercher",
    "ne peut être exclu",
    "pas exclu",
    "si",
];

const HYPOTHESIS_PSEUDO: &[&str] = &["pas de doute", "sans doute", "si besoin", "si nécessaire"];

const REPORTED: &[&str] = &[
    "dit",
    "disent",
    "dit avoir",
    "affirme",
    "déclare",
    "rapporte",
    "signale",
    "décrit",
    "raconte",
    "évoque",
    "se plaint",
    "se plaint de",
    "selon le patient",
    "selon la patiente",
    "d'après le patient",
    "d'après la patiente",
    "d'après la famille",
    "selon la famille",
    "aurait",
    "auraient",
];

const HISTORY: &[&str] = &[
    "antécédent",
    "antécédents",
    "atcd",
    "atcds",
    "atcdt",
    "atcdts",
    "antécédents médicaux",
    "antécédents chirurgicaux",
    "dans les antécédents",
    "histoire de",
    "ancien",
    "ancienne",
    "anciennement",
    "séquelle",
    "séquelles",
    "en rémission",
    "guéri",
    "guérie",
];

/// Regexes for past-date references in history cues
const HISTORY_REGEX: &[&str] = &[
    r"\bil y a \d+ (?:ans?|mois|semaines?)\b",
    r"\ben (?:19|20)\d{2}\b",
    r"\bdepuis l'enfance\b",
];

/// Built-in cue vocabulary of a qualifier kind
pub fn qualifier_vocabulary(kind: QualifierKind) -> Vocabulary {
    let termination = Vocabulary::new().with_terms(TERMINATION_KEY, TERMINATION.iter().copied());
    match kind {
        QualifierKind::Negation => termination
            .with_terms("negation", NEGATION.iter().copied())
            .with_terms(PSEUDO_KEY, NEGATION_PSEUDO.iter().copied()),
        QualifierKind::Family => termination
            .with_terms("family", FAMILY.iter().copied())
            .with_terms(PSEUDO_KEY, FAMILY_PSEUDO.iter().copied()),
        QualifierKind::Hypothesis => termination
            .with_terms("hypothesis", HYPOTHESIS.iter().copied())
            .with_terms(PSEUDO_KEY, HYPOTHESIS_PSEUDO.iter().copied()),
        QualifierKind::ReportedSpeech => {
            termination.with_terms("reported", REPORTED.iter().copied())
        }
        QualifierKind::History => termination
            .with_terms("history", HISTORY.iter().copied())
            .with_regex("history", HISTORY_REGEX.iter().copied()),
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Label of the past-history section
pub const SECTION_HISTORY: &str = "antécédents";

/// Label of the family-history section
pub const SECTION_FAMILY: &str = "antécédents familiaux";

const SECTION_HEADERS: &[(&str, &[&str])] = &[
    (
        "motif",
        &["motif", "motif d'hospitalisation", "motif de consultation", "motif d'admission"],
    ),
    (
        SECTION_HISTORY,
        &["antécédents", "antécédents médicaux", "antécédents personnels", "atcd"],
    ),
    (SECTION_FAMILY, &["antécédents familiaux", "atcd familiaux"]),
    ("histoire de la maladie", &["histoire de la maladie", "hdm", "histoire récente"]),
    ("mode de vie", &["mode de vie", "habitus"]),
    ("allergies", &["allergies", "allergie"]),
    (
        "traitements entrée",
        &["traitement à l'entrée", "traitements à l'entrée", "traitement habituel"],
    ),
    ("examen clinique", &["examen clinique", "examen physique", "à l'examen"]),
    ("examens complémentaires", &["examens complémentaires", "biologie", "imagerie"]),
    ("évolution", &["évolution", "évolution dans le service"]),
    ("conclusion", &["conclusion", "synthèse", "au total"]),
    (
        "traitements sortie",
        &["traitement de sortie", "traitements de sortie", "ordonnance de sortie"],
    ),
];

/// Built-in section header vocabulary; keys are section labels
pub fn section_vocabulary() -> Vocabulary {
    SECTION_HEADERS
        .iter()
        .fold(Vocabulary::new(), |vocab, (label, headers)| {
            vocab.with_terms(*label, headers.iter().copied())
        })
}

/// Section labels a kind follows by default
pub fn default_section_labels(kind: QualifierKind) -> Vec<String> {
    match kind {
        QualifierKind::History => vec![SECTION_HISTORY.to_string()],
        QualifierKind::Family => vec![SECTION_FAMILY.to_string()],
        _ => Vec::new(),
    }
}

// ============================================================================
// Scores
// ============================================================================

/// Names of the built-in scores
pub const SCORE_NAMES: &[&str] = &["charlson", "emergency_priority"];

/// Built-in score definition
pub fn score_config(name: &str) -> Option<ScoreConfig> {
    match name {
        "charlson" => Some(ScoreConfig {
            regex: vec![r"(?i)\bcharlson\b".to_string()],
            value_extract: Some(r"^.*?[\n\W]*?(\d+)".to_string()),
            normalization: ScoreNormalization::Integer,
            valid_range: Some([0.0, 29.0]),
            window: 7,
            attr: "NORM".to_string(),
            ignore_excluded: true,
        }),
        "emergency_priority" => Some(ScoreConfig {
            regex: vec![r"\bpriorite\b".to_string()],
            value_extract: Some(r"^[\s:=]*(\d+)".to_string()),
            normalization: ScoreNormalization::Integer,
            valid_range: Some([0.0, 5.0]),
            window: 7,
            attr: "NORM".to_string(),
            ignore_excluded: true,
        }),
        _ => None,
    }
}

/// Every built-in score, by name
pub fn builtin_scores() -> BTreeMap<String, ScoreConfig> {
    SCORE_NAMES
        .iter()
        .filter_map(|name| score_config(name).map(|config| (name.to_string(), config)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_cues_and_terminations() {
        for kind in QualifierKind::ALL {
            let vocab = qualifier_vocabulary(kind);
            let keys: Vec<&str> = vocab.keys().collect();
            assert!(keys.contains(&TERMINATION_KEY), "{kind}");
            assert!(
                keys.iter().any(|k| *k != TERMINATION_KEY && *k != PSEUDO_KEY),
                "{kind} has no cue key"
            );
        }
    }

    #[test]
    fn test_section_vocabulary_labels() {
        let vocab = section_vocabulary();
        let keys: Vec<&str> = vocab.keys().collect();
        assert!(keys.contains(&SECTION_HISTORY));
        assert!(keys.contains(&SECTION_FAMILY));
        assert!(keys.contains(&"conclusion"));
    }

    #[test]
    fn test_builtin_scores() {
        let scores = builtin_scores();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["emergency_priority"].valid_range, Some([0.0, 5.0]));
        assert!(score_config("sofa").is_none());
    }
}
