//! Named text-cleaner pipelines.
//!
//! A cleaner turns raw input text into the spoken-word form the symbol
//! vocabulary expects. Pipelines are chosen by name in `pipeline.json`
//! (`text_cleaners`) so another locale can be swapped in without touching
//! the orchestrator.
//!
//! | name                       | steps                                                         |
//! |----------------------------|---------------------------------------------------------------|
//! | `basic_cleaners`           | lowercase, collapse whitespace                                |
//! | `transliteration_cleaners` | ASCII, lowercase, collapse whitespace                         |
//! | `english_cleaners`         | ASCII, lowercase, numbers, abbreviations, collapse whitespace |

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::StartupError;
use crate::numbers::normalize_numbers;

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Abbreviation → expansion, matched case-insensitively at a word start and
/// followed by a period.
static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("mrs", "misess"),
        ("mr", "mister"),
        ("dr", "doctor"),
        ("st", "saint"),
        ("co", "company"),
        ("jr", "junior"),
        ("maj", "major"),
        ("gen", "general"),
        ("drs", "doctors"),
        ("rev", "reverend"),
        ("lt", "lieutenant"),
        ("hon", "honorable"),
        ("sgt", "sergeant"),
        ("capt", "captain"),
        ("esq", "esquire"),
        ("ltd", "limited"),
        ("col", "colonel"),
        ("ft", "fort"),
    ]
    .into_iter()
    .map(|(abbr, word)| (Regex::new(&format!(r"(?i)\b{}\.", abbr)).unwrap(), word))
    .collect()
});

/// Letters NFKD cannot decompose into ASCII.
fn transliterate(c: char) -> Option<&'static str> {
    Some(match c {
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ø' => "o",
        'Ø' => "O",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'ł' => "l",
        'Ł' => "L",
        'þ' => "th",
        'Þ' => "Th",
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '«' | '»' => "\"",
        '\u{2013}' | '\u{2014}' | '\u{2212}' => "-",
        '\u{2026}' => "...",
        _ => return None,
    })
}

/// Transliterate to ASCII; characters with no ASCII reading are dropped.
pub fn convert_to_ascii(text: &str) -> String {
    ascii_except(text, &[])
}

/// As [`convert_to_ascii`], but `keep` passes through untouched.
fn ascii_except(text: &str, keep: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() || keep.contains(&c) {
            out.push(c);
        } else if let Some(s) = transliterate(c) {
            out.push_str(s);
        } else {
            // é → e + U+0301; keep the base letter
            out.extend(c.to_string().nfkd().filter(char::is_ascii));
        }
    }
    out
}

pub fn lowercase(text: &str) -> String {
    text.to_lowercase()
}

pub fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    RE_WHITESPACE.replace_all(text, " ")
}

pub fn expand_abbreviations(text: &str) -> String {
    let mut text = text.to_string();
    for (re, word) in ABBREVIATIONS.iter() {
        text = re.replace_all(&text, *word).into_owned();
    }
    text
}

// ─────────────────────────────────────────────────────────────────────────────
// Named pipelines
// ─────────────────────────────────────────────────────────────────────────────

/// A cleaner pipeline selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleaner {
    Basic,
    Transliteration,
    English,
}

impl Cleaner {
    pub const ALL: [Cleaner; 3] = [Cleaner::Basic, Cleaner::Transliteration, Cleaner::English];

    pub fn from_name(name: &str) -> Result<Self, StartupError> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| StartupError::UnknownCleaner(name.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Cleaner::Basic => "basic_cleaners",
            Cleaner::Transliteration => "transliteration_cleaners",
            Cleaner::English => "english_cleaners",
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Cleaner::Basic => collapse_whitespace(&lowercase(text)).into_owned(),
            Cleaner::Transliteration => {
                collapse_whitespace(&lowercase(&convert_to_ascii(text))).into_owned()
            }
            Cleaner::English => {
                // `£` must survive until number expansion reads `£N` as `N pounds`
                let text = lowercase(&ascii_except(text, &['£']));
                let text = convert_to_ascii(&normalize_numbers(&text));
                let text = expand_abbreviations(&text);
                collapse_whitespace(&text).into_owned()
            }
        }
    }
}

/// Run `cleaners` over `text` in order.
pub fn clean(text: &str, cleaners: &[Cleaner]) -> String {
    cleaners.iter().fold(text.to_string(), |t, c| c.apply(&t))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Cleaner::from_name("english_cleaners").unwrap(), Cleaner::English);
        assert_eq!(Cleaner::from_name("basic_cleaners").unwrap(), Cleaner::Basic);
        assert!(Cleaner::from_name("English_Cleaners").is_err());
        for c in Cleaner::ALL {
            assert_eq!(Cleaner::from_name(c.name()).unwrap(), c);
        }
    }

    #[test]
    fn test_basic_keeps_unicode() {
        assert_eq!(Cleaner::Basic.apply("  Café\tNOIR  "), " café noir ");
    }

    #[test]
    fn test_ascii_conversion() {
        assert_eq!(convert_to_ascii("Café crème"), "Cafe creme");
        assert_eq!(convert_to_ascii("Straße"), "Strasse");
        assert_eq!(convert_to_ascii("\u{201C}hi\u{201D} \u{2014} it\u{2019}s"), "\"hi\" - it's");
        assert_eq!(convert_to_ascii("日本"), "");
    }

    #[test]
    fn test_abbreviations() {
        assert_eq!(expand_abbreviations("dr. smith met mrs. jones"), "doctor smith met misess jones");
        // no trailing period: left alone
        assert_eq!(expand_abbreviations("dr smith"), "dr smith");
    }

    #[test]
    fn test_english_cleaners() {
        let out = Cleaner::English.apply("Dr. Smith bought 3 apples for $4.50 in 1984.");
        assert_eq!(
            out,
            "doctor smith bought three apples for four dollars, fifty cents in nineteen eighty-four."
        );
    }

    #[test]
    fn test_english_reads_pounds() {
        assert_eq!(Cleaner::English.apply("It costs £5 today"), "it costs five pounds today");
        assert_eq!(Cleaner::English.apply("£1,200 in Zürich"), "twelve hundred pounds in zurich");
        // no amount: the sign has no reading and is dropped
        assert_eq!(Cleaner::English.apply("£ sign"), " sign");
    }

    #[test]
    fn test_transliteration_cleaners() {
        assert_eq!(
            Cleaner::Transliteration.apply("  Ærøskøbing \u{2014} CAFÉ\u{2019}s 42  "),
            " aeroskobing - cafe's 42 "
        );
    }

    #[test]
    fn test_english_collapses_whitespace() {
        assert_eq!(Cleaner::English.apply("hello \n\n  world"), "hello world");
    }

    #[test]
    fn test_clean_runs_in_order() {
        let out = clean("Mr. X", &[Cleaner::Basic, Cleaner::English]);
        assert_eq!(out, "mister x");
    }
}
