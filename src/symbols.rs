//! Symbol vocabulary of the pretrained Tacotron 2 model.
//!
//! The id of a symbol is its index in
//!   `[pad] + special + punctuation + letters + ['@' + phone for phone in ARPABET]`
//! so the ordering below must never change without bumping
//! [`SYMBOLS_VERSION`].

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Identifies the vocabulary layout the model weights were trained against.
pub const SYMBOLS_VERSION: &str = "tacotron2-en-v1";

const PAD: char = '_';
/// Reserved by the training data as an end marker; never emitted.
const EOS: char = '~';
const SPECIAL: &str = "-";
const PUNCTUATION: &str = "!'(),.:;? ";
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// CMUdict phone set, with stress markers.
pub const ARPABET: [&str; 84] = [
    "AA", "AA0", "AA1", "AA2", "AE", "AE0", "AE1", "AE2", "AH", "AH0", "AH1", "AH2",
    "AO", "AO0", "AO1", "AO2", "AW", "AW0", "AW1", "AW2", "AY", "AY0", "AY1", "AY2",
    "B", "CH", "D", "DH", "EH", "EH0", "EH1", "EH2", "ER", "ER0", "ER1", "ER2", "EY",
    "EY0", "EY1", "EY2", "F", "G", "HH", "IH", "IH0", "IH1", "IH2", "IY", "IY0", "IY1",
    "IY2", "JH", "K", "L", "M", "N", "NG", "OW", "OW0", "OW1", "OW2", "OY", "OY0",
    "OY1", "OY2", "P", "R", "S", "SH", "T", "TH", "UH", "UH0", "UH1", "UH2", "UW",
    "UW0", "UW1", "UW2", "V", "W", "Y", "Z", "ZH",
];

/// Every symbol, in id order.
static SYMBOLS: Lazy<Vec<String>> = Lazy::new(|| {
    std::iter::once(PAD)
        .chain(SPECIAL.chars())
        .chain(PUNCTUATION.chars())
        .chain(LETTERS.chars())
        .map(String::from)
        .chain(ARPABET.iter().map(|p| format!("@{}", p)))
        .collect()
});

static CHAR_IDS: Lazy<HashMap<char, i64>> = Lazy::new(|| {
    SYMBOLS
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.starts_with('@'))
        .filter_map(|(i, s)| s.chars().next().map(|c| (c, i as i64)))
        .collect()
});

static PHONE_IDS: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    let offset = SYMBOLS.len() - ARPABET.len();
    ARPABET.iter().enumerate().map(|(i, &p)| (p, (offset + i) as i64)).collect()
});

/// Number of symbols in the vocabulary.
pub fn symbol_count() -> usize {
    SYMBOLS.len()
}

/// Id of a text character, or `None` if it is not a speakable symbol.
///
/// Padding and the end marker are never produced from user text.
pub fn char_to_id(c: char) -> Option<i64> {
    if c == PAD || c == EOS {
        return None;
    }
    CHAR_IDS.get(&c).copied()
}

/// Id of an ARPAbet phone such as `HH` or `OW1`.
pub fn phone_to_id(phone: &str) -> Option<i64> {
    PHONE_IDS.get(phone).copied()
}

/// Symbol for an id; phones keep their `@` prefix.
pub fn id_to_symbol(id: i64) -> Option<&'static str> {
    usize::try_from(id).ok().and_then(|i| SYMBOLS.get(i)).map(String::as_str)
}

/// Render ids back to text, phones wrapped in braces: `{HH AH0} there`.
pub fn sequence_to_text(ids: &[i64]) -> String {
    let mut out = String::new();
    let mut in_phones = false;
    for s in ids.iter().filter_map(|&id| id_to_symbol(id)) {
        match s.strip_prefix('@') {
            Some(phone) => {
                out.push(if in_phones { ' ' } else { '{' });
                out.push_str(phone);
                in_phones = true;
            }
            None => {
                if in_phones {
                    out.push('}');
                    in_phones = false;
                }
                out.push_str(s);
            }
        }
    }
    if in_phones {
        out.push('}');
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_size() {
        assert_eq!(symbol_count(), 148);
    }

    #[test]
    fn test_layout() {
        assert_eq!(id_to_symbol(0), Some("_"));
        assert_eq!(char_to_id('-'), Some(1));
        assert_eq!(char_to_id('!'), Some(2));
        assert_eq!(char_to_id(' '), Some(11));
        assert_eq!(char_to_id('A'), Some(12));
        assert_eq!(char_to_id('a'), Some(38));
        assert_eq!(phone_to_id("AA"), Some(64));
        assert_eq!(phone_to_id("ZH"), Some(147));
    }

    #[test]
    fn test_pad_and_eos_are_not_speakable() {
        assert_eq!(char_to_id('_'), None);
        assert_eq!(char_to_id('~'), None);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(char_to_id('é'), None);
        assert_eq!(char_to_id('"'), None);
        assert_eq!(phone_to_id("XX1"), None);
        assert_eq!(id_to_symbol(-1), None);
        assert_eq!(id_to_symbol(148), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for s in SYMBOLS.iter() {
            assert!(seen.insert(s.as_str()), "duplicate symbol {}", s);
        }
    }

    #[test]
    fn test_sequence_to_text() {
        let mut ids: Vec<i64> = ["HH", "AH0"].iter().map(|p| phone_to_id(p).unwrap()).collect();
        ids.extend(" hi".chars().map(|c| char_to_id(c).unwrap()));
        assert_eq!(sequence_to_text(&ids), "{HH AH0} hi");
    }
}
