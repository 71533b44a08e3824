//! Text normalization backing the NORM attribute

/// Lowercase, strip accents and unify quotes
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        match fold(c) {
            Some(folded) => out.push_str(folded),
            None => out.push(c),
        }
    }
    out
}

fn fold(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'œ' => "oe",
        'æ' => "ae",
        '’' | '‘' | '`' | '´' => "'",
        '«' | '»' | '“' | '”' => "\"",
        '\u{a0}' | '\u{202f}' => " ",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accents() {
        assert_eq!(normalize("Antécédents"), "antecedents");
        assert_eq!(normalize("Priorité"), "priorite");
        assert_eq!(normalize("SŒUR"), "soeur");
    }

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(normalize("n’est"), "n'est");
        assert_eq!(normalize("«oui»"), "\"oui\"");
    }

    #[test]
    fn test_normalize_keeps_plain_ascii() {
        assert_eq!(normalize("abc 123 ,;"), "abc 123 ,;");
    }
}
