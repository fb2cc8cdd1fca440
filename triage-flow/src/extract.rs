use std::collections::BTreeSet;

use crate::vocabulary::{Vocabulary, normalize};

/// Recognizes medication names from a closed vocabulary. Names outside the vocabulary are
/// not reported.
#[derive(Debug, Clone)]
pub struct MedicationExtractor {
    vocabulary: Vocabulary,
}

impl MedicationExtractor {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// Distinct mentions, lower-cased. Run this on raw text, not on annotated HTML.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        self.vocabulary
            .find_all(text)
            .into_iter()
            .map(|m| normalize(m.as_str()))
            .collect()
    }
}

impl Default for MedicationExtractor {
    fn default() -> Self {
        Self::new(Vocabulary::medications())
    }
}

/// Extraction with the bundled medication vocabulary
pub fn extract_medications(text: &str) -> BTreeSet<String> {
    MedicationExtractor::default().extract(text)
}
