use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    annotate::{EMERGENCY_MARKER, MEDICATION_HEADER, SEEK_CARE_MARKER, SELF_CARE_MARKER},
    input::{ImageAttachment, PatientContext},
    language::Language,
    services::{InferenceService, ServiceError, bounded},
};

/// Prefix of every user-facing assessment failure message
pub const GENERATION_ERROR_PREFIX: &str = "Error generating response:";

pub const VISION_PROMPT: &str = "Analyze this medical image for symptoms, possible conditions, and urgency level. \
Focus on visible symptoms like rashes, wounds, swelling, or discoloration. \
Provide recommendations similar to the text analysis format.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Error generating response: {0}")]
    Assessment(#[source] ServiceError),

    #[error("Error analyzing image: {0}")]
    ImageAnalysis(#[source] ServiceError),

    #[error("Error generating response: the model returned an empty answer")]
    EmptyResponse,

    #[error("Error generating response: no symptom description or image analysis to assess")]
    NoSymptomSource,
}

/// Raw model answer of a successful generate step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentText(String);

impl AssessmentText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_emergency(&self) -> bool {
        self.0.contains(EMERGENCY_MARKER)
    }

    pub fn has_medication_section(&self) -> bool {
        self.0.contains(MEDICATION_HEADER)
    }
}

impl AsRef<str> for AssessmentText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssessmentText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct AssessmentGenerator {
    inference: Arc<dyn InferenceService>,
    timeout: Duration,
}

impl AssessmentGenerator {
    pub fn new(inference: Arc<dyn InferenceService>, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    /// One inference call for the assessment. The image description, if any, travels
    /// inside `context`.
    pub async fn generate(
        &self,
        context: &PatientContext,
        language: Language,
    ) -> Result<AssessmentText, GenerationError> {
        if !context.has_symptom_source() {
            return Err(GenerationError::NoSymptomSource);
        }

        let prompt = assessment_prompt(context, language);
        info!(
            language = language.name(),
            prompt_chars = prompt.len(),
            with_image = context.image_description.is_some(),
            "Requesting health assessment"
        );

        let text = bounded(self.timeout, self.inference.generate(&prompt))
            .await
            .map_err(|e| {
                error!(error = %e, "Assessment generation failed");
                GenerationError::Assessment(e)
            })?;

        if text.trim().is_empty() {
            error!("Model returned an empty assessment");
            return Err(GenerationError::EmptyResponse);
        }

        // Structurally a success; only the content looks like a failure message.
        if text.trim_start().starts_with(GENERATION_ERROR_PREFIX) {
            warn!("Assessment text begins with the generation error prefix; keeping it as a real assessment");
        }

        info!(response_chars = text.len(), "Health assessment generated");
        Ok(AssessmentText(text))
    }

    /// One vision call describing the visible symptoms in `image`.
    pub async fn analyze_image(&self, image: &ImageAttachment) -> Result<String, GenerationError> {
        info!(
            media_type = %image.media_type,
            bytes = image.data.len(),
            "Analyzing symptom image"
        );

        let description = bounded(
            self.timeout,
            self.inference.generate_with_image(VISION_PROMPT, image),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "Image analysis failed");
            GenerationError::ImageAnalysis(e)
        })?;

        if description.trim().is_empty() {
            return Err(GenerationError::ImageAnalysis(ServiceError::InvalidResponse(
                "empty image analysis".to_string(),
            )));
        }
        Ok(description)
    }
}

pub fn assessment_prompt(context: &PatientContext, language: Language) -> String {
    let visual_analysis = context
        .image_description
        .as_deref()
        .map(|description| format!("\n\nAdditional Visual Symptom Analysis:\n{description}"))
        .unwrap_or_default();

    format!(
        r#"You are an AI Health Assistant. Analyze the following patient information and provide detailed recommendations:

1. Possible conditions (list 3-5 most likely, ordered by probability)
2. Urgency level (emergency, seek care soon, self-care)
3. Recommended next steps (when to see a doctor, self-care tips)
4. Any red flag symptoms to watch for
5. SPECIFIC MEDICATION RECOMMENDATIONS (both prescription and OTC options)

MEDICATION GUIDELINES:
- For common/minor issues: Suggest specific OTC medications with standard dosages
- For serious conditions: State that prescription medications are needed and list common options doctors might prescribe
- Always consider the patient's current medications and allergies
- Include both generic and brand names when available
- Provide standard adult dosages (unless pediatric case)
- Highlight important warnings (allergies, interactions, side effects)
- Still recommend doctor consultation for proper diagnosis

IMPORTANT FORMATTING:
- Urgency level must use exactly:
  * "{EMERGENCY_MARKER}" (red)
  * "{SEEK_CARE_MARKER}" (orange)
  * "{SELF_CARE_MARKER}" (green)

- Medication section must begin with: "{MEDICATION_HEADER}"

{directive}

{patient}
{visual_analysis}

Provide clear, actionable recommendations while emphasizing safety.
"#,
        directive = language.directive(),
        patient = patient_section(context),
    )
}

fn patient_section(context: &PatientContext) -> String {
    format!(
        "Patient Information:
- Symptoms: {}
- Duration: {}
- Severity: {}
- Location: {}
- Onset: {}
- Age: {}
- Gender: {}
- Medical History: {}
- Current Medications: {}
- Allergies: {}
- Lifestyle: {}",
        context.symptoms,
        context.duration,
        context.severity.label(),
        context.location,
        context.onset.label(),
        context.age_label(),
        context.gender,
        context.medical_history,
        context.current_medications,
        context.allergies,
        context.lifestyle,
    )
}
