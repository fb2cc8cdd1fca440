//! Input assembly: raw form fields in, a normalized [`PatientContext`] out.

use serde::{Deserialize, Serialize};

/// Placeholder for any field the patient left empty
pub const NOT_SPECIFIED: &str = "Not specified";

/// Field values as submitted by the patient, before any normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPatientInput {
    pub symptoms: String,
    pub duration: String,
    pub severity: String,
    pub location: String,
    pub onset: String,
    pub age: Option<i64>,
    pub gender: String,
    pub medical_history: String,
    pub current_medications: String,
    pub allergies: String,
    pub lifestyle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Unspecified,
    Mild,
    Moderate,
    Severe,
    WorstEver,
}

impl Severity {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "mild" => Severity::Mild,
            "moderate" => Severity::Moderate,
            "severe" => Severity::Severe,
            "worst pain ever" | "worst ever" | "worst-ever" | "worst_ever" => Severity::WorstEver,
            _ => Severity::Unspecified,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Unspecified => NOT_SPECIFIED,
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
            Severity::WorstEver => "Worst pain ever",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Onset {
    #[default]
    Unspecified,
    Sudden,
    Gradual,
    Constant,
    Intermittent,
    Worsening,
}

impl Onset {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "sudden" => Onset::Sudden,
            "gradual" => Onset::Gradual,
            "constant" => Onset::Constant,
            "intermittent" => Onset::Intermittent,
            "worsening" => Onset::Worsening,
            _ => Onset::Unspecified,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Onset::Unspecified => NOT_SPECIFIED,
            Onset::Sudden => "Sudden",
            Onset::Gradual => "Gradual",
            Onset::Constant => "Constant",
            Onset::Intermittent => "Intermittent",
            Onset::Worsening => "Worsening",
        }
    }
}

/// Normalized patient report. Empty text fields hold [`NOT_SPECIFIED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub symptoms: String,
    pub duration: String,
    pub severity: Severity,
    pub location: String,
    pub onset: Onset,
    /// `None` when missing or not positive
    pub age: Option<u32>,
    pub gender: String,
    pub medical_history: String,
    pub current_medications: String,
    pub allergies: String,
    pub lifestyle: String,
    pub image_description: Option<String>,
    /// Whether the patient typed any symptom text, independent of the placeholder
    #[serde(default)]
    symptoms_given: bool,
}

impl PatientContext {
    /// Assemble a context from raw fields. Never fails.
    pub fn assemble(raw: &RawPatientInput, image_description: Option<&str>) -> Self {
        Self {
            symptoms: or_not_specified(&raw.symptoms),
            duration: or_not_specified(&raw.duration),
            severity: Severity::parse(&raw.severity),
            location: or_not_specified(&raw.location),
            onset: Onset::parse(&raw.onset),
            age: raw
                .age
                .filter(|age| *age > 0)
                .and_then(|age| u32::try_from(age).ok()),
            gender: or_not_specified(&raw.gender),
            medical_history: or_not_specified(&raw.medical_history),
            current_medications: or_not_specified(&raw.current_medications),
            allergies: or_not_specified(&raw.allergies),
            lifestyle: or_not_specified(&raw.lifestyle),
            image_description: image_description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            symptoms_given: !raw.symptoms.trim().is_empty(),
        }
    }

    pub fn with_image_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.image_description = Some(description);
        }
        self
    }

    pub fn has_symptoms(&self) -> bool {
        self.symptoms_given
    }

    /// At least one of symptoms text or image description is present
    pub fn has_symptom_source(&self) -> bool {
        self.has_symptoms() || self.image_description.is_some()
    }

    pub fn age_label(&self) -> String {
        self.age
            .map(|age| age.to_string())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string())
    }
}

fn or_not_specified(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Uploaded photo of a visible symptom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub file_name: Option<String>,
    /// `image/jpeg`, `image/png` or `image/webp`
    pub media_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(file_name: Option<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name,
            media_type: media_type.into(),
            data,
        }
    }

    pub fn reference(&self) -> ImageReference {
        ImageReference {
            file_name: self.file_name.clone(),
            media_type: self.media_type.clone(),
            byte_len: self.data.len(),
        }
    }
}

/// What the session exposes about the image to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub file_name: Option<String>,
    pub media_type: String,
    pub byte_len: usize,
}
