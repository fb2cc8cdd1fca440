//! Urgency color-coding and medication/dosage highlighting of model output.
//!
//! Annotation only wraps substrings in inline-styled HTML; the underlying text is never
//! altered. Extraction must run on the raw text, not on the annotated output.

use serde::{Deserialize, Serialize};

use crate::vocabulary::{Vocabulary, dosage_pattern};

pub const EMERGENCY_MARKER: &str = "Urgency Level: Emergency";
pub const SEEK_CARE_MARKER: &str = "Urgency Level: Seek care soon";
pub const SELF_CARE_MARKER: &str = "Urgency Level: Self-care";
pub const MEDICATION_HEADER: &str = "### Medication Recommendations:";

const MEDICATION_HEADING_HTML: &str =
    r#"<h4 style="color:#2b5876; margin-top:20px">💊 Medication Recommendations:</h4>"#;

/// Triage level announced by one of the three fixed urgency markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Emergency,
    SeekCareSoon,
    SelfCare,
}

impl UrgencyLevel {
    /// Detection precedence
    pub const ALL: [UrgencyLevel; 3] = [
        UrgencyLevel::Emergency,
        UrgencyLevel::SeekCareSoon,
        UrgencyLevel::SelfCare,
    ];

    pub fn marker(self) -> &'static str {
        match self {
            UrgencyLevel::Emergency => EMERGENCY_MARKER,
            UrgencyLevel::SeekCareSoon => SEEK_CARE_MARKER,
            UrgencyLevel::SelfCare => SELF_CARE_MARKER,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            UrgencyLevel::Emergency => "red",
            UrgencyLevel::SeekCareSoon => "orange",
            UrgencyLevel::SelfCare => "green",
        }
    }

    pub fn detect(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| text.contains(level.marker()))
    }

    pub fn styled_span(self) -> String {
        format!(
            r#"<span style="color:{}; font-weight:bold">{}</span>"#,
            self.color(),
            self.marker()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedAssessment {
    pub html: String,
    pub urgency: Option<UrgencyLevel>,
}

#[derive(Debug, Clone)]
pub struct Annotator {
    highlight: Vocabulary,
}

impl Annotator {
    pub fn new(highlight: Vocabulary) -> Self {
        Self { highlight }
    }

    pub fn annotate(&self, text: &str) -> AnnotatedAssessment {
        let (colored, urgency) = color_urgency(text);
        AnnotatedAssessment {
            html: self.highlight_medications(&colored),
            urgency,
        }
    }

    /// Styles the medication header, OTC names and dosage tokens.
    pub fn highlight_medications(&self, text: &str) -> String {
        let text = text.replace(MEDICATION_HEADER, MEDICATION_HEADING_HTML);

        let text = self.highlight.wrap_matches(&text, |name| {
            format!(
                r#"<span style="background-color:#979291; padding:2px 5px; border-radius:4px; border:1px solid #cce0ff">{name}</span>"#
            )
        });

        dosage_pattern()
            .replace_all(&text, r#"<span style="font-weight:bold; color:#0066cc">$0</span>"#)
            .into_owned()
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(Vocabulary::otc_highlight())
    }
}

/// Wrap the first occurrence of the highest-precedence urgency marker present.
pub fn color_urgency(text: &str) -> (String, Option<UrgencyLevel>) {
    match UrgencyLevel::detect(text) {
        Some(level) => (
            text.replacen(level.marker(), &level.styled_span(), 1),
            Some(level),
        ),
        None => (text.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn emergency_marker_gets_red_span() {
        let annotated = Annotator::default().annotate("Urgency Level: Emergency\nCall 112.");
        assert_eq!(annotated.urgency, Some(UrgencyLevel::Emergency));
        assert!(annotated.html.contains(
            r#"<span style="color:red; font-weight:bold">Urgency Level: Emergency</span>"#
        ));
    }

    #[test]
    fn each_marker_maps_to_its_color() {
        let annotator = Annotator::default();
        for level in UrgencyLevel::ALL {
            let annotated = annotator.annotate(&format!("Summary.\n{}\nMore.", level.marker()));
            assert_eq!(annotated.urgency, Some(level));
            assert!(annotated.html.contains(&level.styled_span()));
            for other in UrgencyLevel::ALL.into_iter().filter(|l| *l != level) {
                assert!(!annotated.html.contains(&other.styled_span()));
            }
        }
    }

    #[test]
    fn at_most_one_urgency_span() {
        let text = "Urgency Level: Self-care ... later: Urgency Level: Emergency ... Urgency Level: Emergency";
        let annotated = Annotator::default().annotate(text);
        assert_eq!(annotated.urgency, Some(UrgencyLevel::Emergency));
        assert_eq!(count(&annotated.html, "<span style=\"color:"), 1);
    }

    #[test]
    fn near_miss_marker_passes_through() {
        let text = "urgency level: emergency (lower case is not the contract)";
        let annotated = Annotator::default().annotate(text);
        assert_eq!(annotated.urgency, None);
        assert_eq!(annotated.html, text);
    }

    #[test]
    fn highlights_names_dosages_and_header() {
        let text = "### Medication Recommendations:\nTake Ibuprofen 400mg every 8 hours.";
        let html = Annotator::default().annotate(text).html;

        assert!(html.starts_with(MEDICATION_HEADING_HTML));
        assert!(html.contains(">Ibuprofen</span>"));
        assert!(html.contains(r#"<span style="font-weight:bold; color:#0066cc">400mg</span>"#));
        assert!(html.contains(r#"<span style="font-weight:bold; color:#0066cc">8 hours</span>"#));
    }

    #[test]
    fn annotation_preserves_text_content() {
        let text = "Urgency Level: Seek care soon. Aspirin 75mg daily.";
        let html = Annotator::default().annotate(text).html;
        let stripped = regex::Regex::new(r"<[^>]*>").unwrap().replace_all(&html, "");
        assert_eq!(stripped, text);
    }

    #[test]
    fn marker_free_text_is_a_fixed_point() {
        let annotator = Annotator::default();
        let text = "Rest, drink fluids and sleep well.";
        let once = annotator.annotate(text).html;
        let twice = annotator.annotate(&once).html;
        assert_eq!(once, text);
        assert_eq!(twice, once);
    }

    #[test]
    fn passes_commute() {
        let annotator = Annotator::default();
        let text = "Urgency Level: Self-care\nParacetamol 500mg up to 4 times per day.";

        let (colored, _) = color_urgency(text);
        let color_then_highlight = annotator.highlight_medications(&colored);
        let (highlight_then_color, _) = color_urgency(&annotator.highlight_medications(text));

        assert_eq!(color_then_highlight, highlight_then_color);
    }
}
