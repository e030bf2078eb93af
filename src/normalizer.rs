//! Raw text → [`SymbolSequence`].
//!
//! Text outside curly braces goes through the configured cleaners and is
//! mapped character by character; text inside braces is read as ARPAbet:
//!
//! ```text
//! "Turn {L EH1 F T} now."  →  cleaners("Turn ") + @L @EH1 @F @T + cleaners(" now.")
//! ```

use tracing::debug;

use crate::cleaners::{clean, Cleaner};
use crate::config::UnknownSymbolPolicy;
use crate::error::{InputError, StartupError};
use crate::symbols::{char_to_id, phone_to_id};

/// Vocabulary ids for one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolSequence(Vec<i64>);

impl SymbolSequence {
    pub fn new(ids: Vec<i64>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Cleaner pipeline plus unknown-symbol policy, fixed at construction.
#[derive(Debug, Clone)]
pub struct Normalizer {
    cleaners: Vec<Cleaner>,
    policy: UnknownSymbolPolicy,
}

impl Normalizer {
    /// Resolve cleaner names. An unknown name fails here, not per request.
    pub fn new<S: AsRef<str>>(
        cleaner_names: &[S],
        policy: UnknownSymbolPolicy,
    ) -> Result<Self, StartupError> {
        let cleaners = cleaner_names
            .iter()
            .map(|n| Cleaner::from_name(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cleaners, policy })
    }

    /// Symbols the vocabulary adds around every utterance (none for English).
    pub fn boundary_symbols(&self) -> usize {
        0
    }

    pub fn normalize(&self, text: &str) -> Result<SymbolSequence, InputError> {
        let mut ids = Vec::new();
        let mut unknown = String::new();
        let mut rest = text;

        while !rest.is_empty() {
            let Some(open) = rest.find('{') else {
                self.push_text(rest, &mut ids, &mut unknown);
                break;
            };
            let close = rest[open..].find('}').ok_or(InputError::UnclosedBrace)? + open;
            self.push_text(&rest[..open], &mut ids, &mut unknown);
            push_phones(&rest[open + 1..close], &mut ids)?;
            rest = &rest[close + 1..];
        }

        if !unknown.is_empty() {
            match self.policy {
                UnknownSymbolPolicy::Drop => debug!(dropped = %unknown, "dropped out-of-vocabulary characters"),
                UnknownSymbolPolicy::Reject => return Err(InputError::UnknownSymbols { chars: unknown }),
            }
        }
        // nothing left to speak, spaces alone included
        let space = char_to_id(' ');
        if ids.iter().all(|&id| Some(id) == space) {
            return Err(InputError::Empty);
        }
        Ok(SymbolSequence(ids))
    }

    fn push_text(&self, text: &str, ids: &mut Vec<i64>, unknown: &mut String) {
        if text.is_empty() {
            return;
        }
        let cleaned = clean(text, &self.cleaners);
        debug!(cleaned = %cleaned, "cleaned text");
        for c in cleaned.chars() {
            match char_to_id(c) {
                Some(id) => ids.push(id),
                None if !unknown.contains(c) => unknown.push(c),
                None => {}
            }
        }
    }
}

fn push_phones(phones: &str, ids: &mut Vec<i64>) -> Result<(), InputError> {
    for phone in phones.split_whitespace() {
        let id = phone_to_id(phone).ok_or_else(|| InputError::UnknownPhone { phone: phone.to_string() })?;
        ids.push(id);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::sequence_to_text;

    fn english() -> Normalizer {
        Normalizer::new(&["english_cleaners"], UnknownSymbolPolicy::Drop).unwrap()
    }

    #[test]
    fn test_hello_world() {
        let seq = english().normalize("Hello world.").unwrap();
        assert_eq!(seq.len(), "hello world.".len());
        assert_eq!(sequence_to_text(seq.ids()), "hello world.");
    }

    #[test]
    fn test_numbers_are_spoken() {
        let seq = english().normalize("I have 2 cats").unwrap();
        assert_eq!(sequence_to_text(seq.ids()), "i have two cats");
    }

    #[test]
    fn test_arpabet_passthrough() {
        let seq = english().normalize("Say {HH AH0 L OW1} now").unwrap();
        assert_eq!(sequence_to_text(seq.ids()), "say {HH AH0 L OW1} now");
    }

    #[test]
    fn test_unknown_phone() {
        let err = english().normalize("{HH XX9}").unwrap_err();
        assert_eq!(err, InputError::UnknownPhone { phone: "XX9".into() });
    }

    #[test]
    fn test_unclosed_brace() {
        assert_eq!(english().normalize("oops {HH AH0").unwrap_err(), InputError::UnclosedBrace);
    }

    #[test]
    fn test_empty_after_cleaning() {
        assert_eq!(english().normalize("").unwrap_err(), InputError::Empty);
        assert_eq!(english().normalize("日本語").unwrap_err(), InputError::Empty);
        assert_eq!(english().normalize("{}").unwrap_err(), InputError::Empty);
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        for text in ["   ", " \t\n ", "日本 語", "{ } "] {
            assert_eq!(english().normalize(text).unwrap_err(), InputError::Empty, "text {text:?}");
        }
        assert_eq!(english().normalize(" a ").unwrap().len(), 3);
    }

    #[test]
    fn test_drop_and_reject_policies() {
        let basic = Normalizer::new(&["basic_cleaners"], UnknownSymbolPolicy::Drop).unwrap();
        let seq = basic.normalize("a\"b_c~").unwrap();
        assert_eq!(sequence_to_text(seq.ids()), "abc");

        let strict = Normalizer::new(&["basic_cleaners"], UnknownSymbolPolicy::Reject).unwrap();
        let err = strict.normalize("a\"b_c\"").unwrap_err();
        assert_eq!(err, InputError::UnknownSymbols { chars: "\"_".into() });
    }

    #[test]
    fn test_unknown_cleaner_name() {
        let err = Normalizer::new(&["nope"], UnknownSymbolPolicy::Drop).unwrap_err();
        assert!(matches!(err, StartupError::UnknownCleaner(_)));
    }

    #[test]
    fn test_no_boundary_symbols() {
        let n = english();
        assert_eq!(n.boundary_symbols(), 0);
        assert_eq!(n.normalize("ab").unwrap().len(), 2 + n.boundary_symbols());
    }
}
