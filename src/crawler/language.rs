//! Lightweight language identification
//!
//! Pages usually declare their language (`<html lang>`); this fills the gap
//! when they do not, using script detection and stopword frequency.

const STOPWORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "of", "to", "is", "in", "that", "it", "for", "with", "this", "are", "be", "as", "you"]),
    ("de", &["der", "die", "und", "das", "ist", "nicht", "mit", "ein", "eine", "zu", "den", "sie", "auf", "sich"]),
    ("fr", &["le", "la", "les", "et", "des", "est", "une", "un", "pour", "dans", "que", "qui", "pas", "sur"]),
    ("es", &["el", "la", "los", "las", "y", "que", "es", "por", "una", "para", "con", "del", "se", "como"]),
    ("pt", &["o", "os", "as", "e", "que", "um", "uma", "para", "com", "não", "do", "da", "em", "se"]),
    ("it", &["il", "lo", "gli", "che", "e", "di", "un", "una", "per", "non", "con", "del", "della", "sono"]),
    ("nl", &["de", "het", "een", "en", "van", "is", "dat", "niet", "op", "met", "voor", "zijn", "ook", "je"]),
];

/// Minimum stopword share for a confident guess
const MIN_STOPWORD_RATIO: f32 = 0.08;

/// Primary subtag of a language tag: `en-US` and `EN_gb` become `en`
pub fn primary_subtag(tag: &str) -> Option<String> {
    let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
    (primary.len() >= 2 && primary.len() <= 3 && primary.chars().all(|c| c.is_ascii_alphabetic()))
        .then_some(primary)
}

/// Best guess at the language of `text`, or `None` when unsure
pub fn detect_language(text: &str) -> Option<String> {
    if let Some(script_lang) = detect_by_script(text) {
        return Some(script_lang.to_string());
    }

    let words: Vec<String> = text
        .split_whitespace()
        .take(2000)
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < 10 {
        return None;
    }

    let (lang, hits) = STOPWORDS
        .iter()
        .map(|(lang, stops)| (*lang, words.iter().filter(|w| stops.contains(&w.as_str())).count()))
        .max_by_key(|(_, hits)| *hits)?;

    (hits as f32 / words.len() as f32 >= MIN_STOPWORD_RATIO).then(|| lang.to_string())
}

fn detect_by_script(text: &str) -> Option<&'static str> {
    let mut letters = 0usize;
    let (mut han, mut kana, mut hangul, mut cyrillic) = (0usize, 0usize, 0usize, 0usize);
    for c in text.chars().filter(|c| c.is_alphabetic()).take(5000) {
        letters += 1;
        match c as u32 {
            0x3040..=0x30FF => kana += 1,
            0x4E00..=0x9FFF => han += 1,
            0xAC00..=0xD7AF => hangul += 1,
            0x0400..=0x04FF => cyrillic += 1,
            _ => {}
        }
    }
    if letters == 0 {
        return None;
    }
    let share = |n: usize| n as f32 / letters as f32;
    if share(kana) > 0.1 {
        Some("ja")
    } else if share(hangul) > 0.3 {
        Some("ko")
    } else if share(han) > 0.3 {
        Some("zh")
    } else if share(cyrillic) > 0.3 {
        Some("ru")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_subtag() {
        assert_eq!(primary_subtag("en-US").as_deref(), Some("en"));
        assert_eq!(primary_subtag("PT_br").as_deref(), Some("pt"));
        assert_eq!(primary_subtag(""), None);
        assert_eq!(primary_subtag("x"), None);
    }

    #[test]
    fn test_detects_english() {
        let text = "This is the guide to the standard library. It explains how the modules \
                    work and what you can do with them in your own programs.";
        assert_eq!(detect_language(text).as_deref(), Some("en"));
    }

    #[test]
    fn test_detects_german() {
        let text = "Die Bibliothek ist nicht nur ein Werkzeug, sie ist auch eine Sammlung \
                    von Beispielen und der Code ist mit den Tests auf dem neuesten Stand.";
        assert_eq!(detect_language(text).as_deref(), Some("de"));
    }

    #[test]
    fn test_detects_by_script() {
        assert_eq!(detect_language("これはテストです。日本語の文章。").as_deref(), Some("ja"));
        assert_eq!(detect_language("Это документация по стандартной библиотеке").as_deref(), Some("ru"));
    }

    #[test]
    fn test_unsure_on_short_or_code_text() {
        assert_eq!(detect_language("fn main() {}"), None);
        assert_eq!(detect_language(""), None);
    }
}
