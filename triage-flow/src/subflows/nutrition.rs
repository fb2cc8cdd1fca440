use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use super::{SubFlow, SubFlowInput, SubFlowOutcome, SubFlowOutput, require_assessment};
use crate::{
    error::{FlowError, Result},
    input::PatientContext,
    services::{InferenceService, ServiceError, bounded},
    session::SessionState,
};

pub const NUTRITION: &str = "nutrition";

/// Second model call turning the assessment into a personal nutrition plan
pub struct NutritionPlanFlow {
    inference: Arc<dyn InferenceService>,
    timeout: Duration,
}

impl NutritionPlanFlow {
    pub fn new(inference: Arc<dyn InferenceService>, timeout: Duration) -> Self {
        Self { inference, timeout }
    }
}

#[async_trait]
impl SubFlow for NutritionPlanFlow {
    fn id(&self) -> &str {
        NUTRITION
    }

    async fn run(&self, state: &mut SessionState, _input: &SubFlowInput) -> Result<SubFlowOutcome> {
        let assessment = require_assessment(state, self.id())?;
        let patient = state
            .patient()
            .ok_or_else(|| FlowError::SubFlowUnavailable {
                id: NUTRITION.to_string(),
                reason: "no patient information recorded".to_string(),
            })?;
        let prompt = nutrition_prompt(assessment.as_str(), patient);

        info!(prompt_chars = prompt.len(), "Requesting nutrition plan");

        let plan = bounded(self.timeout, self.inference.generate(&prompt))
            .await
            .and_then(|plan| {
                if plan.trim().is_empty() {
                    Err(ServiceError::InvalidResponse("empty nutrition plan".to_string()))
                } else {
                    Ok(plan)
                }
            })
            .map_err(|source| {
                error!(error = %source, "Nutrition plan generation failed");
                FlowError::SubFlowFailed {
                    id: NUTRITION.to_string(),
                    source,
                }
            })?;

        state.record_nutrition_plan(plan.clone());
        info!(plan_chars = plan.len(), "Nutrition plan stored");

        Ok(SubFlowOutcome::new(SubFlowOutput::Nutrition { plan })
            .with_status("Personalized nutrition plan ready"))
    }
}

pub fn nutrition_prompt(assessment: &str, patient: &PatientContext) -> String {
    format!(
        "As a nutritionist, provide detailed dietary recommendations based on:

Health Assessment: {assessment}

Patient Information:
- Age: {age}
- Gender: {gender}
- Conditions: {conditions}
- Medications: {medications}
- Allergies: {allergies}
- Lifestyle: {lifestyle}

Provide:
1. Recommended foods and avoidances (consider allergies)
2. Sample 1-day meal plan
3. Key nutrients to focus on
4. Hydration recommendations
5. Supplement suggestions (if needed)
6. Special considerations based on medications

Format with clear headings and use food emojis for better readability.",
        age = patient.age_label(),
        gender = patient.gender,
        conditions = patient.medical_history,
        medications = patient.current_medications,
        allergies = patient.allergies,
        lifestyle = patient.lifestyle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RawPatientInput;

    #[test]
    fn prompt_carries_assessment_and_patient_profile() {
        let raw = RawPatientInput {
            age: Some(61),
            allergies: "Peanuts".into(),
            current_medications: "Metformin".into(),
            ..Default::default()
        };
        let patient = PatientContext::assemble(&raw, None);

        let prompt = nutrition_prompt("Urgency Level: Self-care. Mild gastritis.", &patient);

        assert!(prompt.contains("Health Assessment: Urgency Level: Self-care. Mild gastritis."));
        assert!(prompt.contains("- Age: 61"));
        assert!(prompt.contains("- Allergies: Peanuts"));
        assert!(prompt.contains("- Medications: Metformin"));
        assert!(prompt.contains("- Lifestyle: Not specified"));
        assert!(prompt.contains("6. Special considerations based on medications"));
    }
}
