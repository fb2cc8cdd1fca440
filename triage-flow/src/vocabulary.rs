//! Closed-list, case-insensitive recognizers for medication names and dosage tokens.
//!
//! A [`Vocabulary`] compiles its entries into one word-boundary regex (a single automaton),
//! so matching cost does not grow with the number of calls. Entries are data, not code: the
//! bundled lists live under `data/` and can be replaced through
//! [`VocabularyConfig`](crate::config::VocabularyConfig).

use regex::{Captures, Match, Regex};
use std::{borrow::Cow, collections::BTreeSet, sync::LazyLock};

use crate::error::{FlowError, Result};

const BUNDLED_HIGHLIGHT: &str = include_str!("../data/highlight_vocabulary.txt");
const BUNDLED_MEDICATIONS: &str = include_str!("../data/medication_vocabulary.txt");

static OTC_HIGHLIGHT: LazyLock<Vocabulary> = LazyLock::new(|| {
    Vocabulary::from_lines(BUNDLED_HIGHLIGHT).expect("bundled highlight vocabulary compiles")
});

static MEDICATIONS: LazyLock<Vocabulary> = LazyLock::new(|| {
    Vocabulary::from_lines(BUNDLED_MEDICATIONS).expect("bundled medication vocabulary compiles")
});

/// Integer, optional single space, then a dosage unit
static DOSAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\s?(?:mg|times per day|hours)").expect("dosage pattern compiles")
});

#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Normalized entries, longest first
    terms: Vec<String>,
    matcher: Option<Regex>,
}

impl Vocabulary {
    pub fn new<I, S>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = terms
            .into_iter()
            .map(|term| normalize(term.as_ref()))
            .filter(|term| !term.is_empty())
            .collect();

        let mut terms: Vec<String> = unique.into_iter().collect();
        // leftmost-first alternation: longer phrases must be tried before their prefixes
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let matcher = if terms.is_empty() {
            None
        } else {
            let alternation = terms
                .iter()
                .map(|term| term_pattern(term))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                .map_err(|e| FlowError::Config(format!("invalid vocabulary: {e}")))?;
            Some(regex)
        };

        Ok(Self { terms, matcher })
    }

    /// One entry per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Result<Self> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Short list of common OTC names used for highlighting
    pub fn otc_highlight() -> Self {
        OTC_HIGHLIGHT.clone()
    }

    /// Full recognition list used for extraction
    pub fn medications() -> Self {
        MEDICATIONS.clone()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(text))
    }

    pub fn find_all<'t>(&self, text: &'t str) -> Vec<Match<'t>> {
        match &self.matcher {
            Some(matcher) => matcher.find_iter(text).collect(),
            None => Vec::new(),
        }
    }

    /// Replace every match with `wrap(matched_text)`, leaving the rest of `text` as is.
    pub fn wrap_matches<'t, F>(&self, text: &'t str, mut wrap: F) -> Cow<'t, str>
    where
        F: FnMut(&str) -> String,
    {
        match &self.matcher {
            Some(matcher) => matcher.replace_all(text, |caps: &Captures| wrap(&caps[0])),
            None => Cow::Borrowed(text),
        }
    }
}

pub fn dosage_pattern() -> &'static Regex {
    &DOSAGE_PATTERN
}

/// Lower-case and collapse inner whitespace
pub fn normalize(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn term_pattern(term: &str) -> String {
    term.split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_vocabularies_load() {
        let highlight = Vocabulary::otc_highlight();
        assert_eq!(highlight.len(), 9);
        assert!(highlight.terms().contains(&"pepto-bismol".to_string()));

        let medications = Vocabulary::medications();
        assert!(medications.len() > 150);
        assert!(medications.terms().contains(&"polyethylene glycol".to_string()));
    }

    #[test]
    fn duplicate_entries_collapse() {
        let vocab = Vocabulary::new(["Aspirin", "aspirin", "  ASPIRIN "]).unwrap();
        assert_eq!(vocab.terms(), &["aspirin".to_string()]);
    }

    #[test]
    fn matches_whole_words_case_insensitively() {
        let vocab = Vocabulary::new(["aspirin", "senna"]).unwrap();
        let found: Vec<&str> = vocab
            .find_all("ASPIRIN at night, sennakot is not senna.")
            .iter()
            .map(|m| m.as_str())
            .collect();
        assert_eq!(found, vec!["ASPIRIN", "senna"]);
        assert!(!vocab.is_match("aspirins"));
    }

    #[test]
    fn multi_word_entries_match_as_phrases() {
        let vocab = Vocabulary::new(["polymyxin b", "polymyxin"]).unwrap();
        let found: Vec<&str> = vocab
            .find_all("Give Polymyxin  B today")
            .iter()
            .map(|m| m.as_str())
            .collect();
        assert_eq!(found, vec!["Polymyxin  B"]);
    }

    #[test]
    fn hyphenated_entry_matches() {
        let vocab = Vocabulary::otc_highlight();
        assert!(vocab.is_match("Try Pepto-Bismol for the nausea"));
    }

    #[test]
    fn empty_vocabulary_never_matches() {
        let vocab = Vocabulary::new(Vec::<String>::new()).unwrap();
        assert!(vocab.is_empty());
        assert!(vocab.find_all("ibuprofen").is_empty());
        assert_eq!(vocab.wrap_matches("ibuprofen", |m| format!("[{m}]")), "ibuprofen");
    }

    #[test]
    fn wrap_matches_keeps_original_casing() {
        let vocab = Vocabulary::new(["ibuprofen"]).unwrap();
        let wrapped = vocab.wrap_matches("Ibuprofen or ibuprofen", |m| format!("[{m}]"));
        assert_eq!(wrapped, "[Ibuprofen] or [ibuprofen]");
    }

    #[test]
    fn dosage_tokens() {
        let found: Vec<&str> = dosage_pattern()
            .find_iter("500mg, 200 mg, 3 times per day, every 6 hours, 2 days")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(found, vec!["500mg", "200 mg", "3 times per day", "6 hours"]);
    }
}
