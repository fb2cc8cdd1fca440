//! The dispatch controller drives a [`SessionState`] through its transitions: one primary
//! submission (`Empty | ResultsShown -> Submitted -> ResultsShown`) and any number of
//! sub-flows branching from `ResultsShown`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{error, info, warn};

use crate::{
    annotate::{Annotator, UrgencyLevel},
    config::PipelineConfig,
    error::{FlowError, Result},
    extract::MedicationExtractor,
    generator::AssessmentGenerator,
    input::{ImageAttachment, PatientContext, RawPatientInput},
    language::Language,
    services::{Collaborators, DocumentExport, ServiceError, bounded},
    session::{CompletedAssessment, Phase, SessionState},
    subflows::{
        EmergencyLookupFlow, NarrationFlow, NutritionPlanFlow, PurchaseLookupFlow, SubFlow,
        SubFlowInput, SubFlowOutcome,
    },
    vocabulary::Vocabulary,
};

pub const MISSING_SYMPTOMS_MESSAGE: &str = "Please describe symptoms or upload an image";

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup pattern compiles"));

/// Type alias for sub-flow guard functions
pub type SubFlowGuard = Arc<dyn Fn(&SessionState) -> bool + Send + Sync>;

#[derive(Clone)]
struct Guard {
    condition: SubFlowGuard,
    reason: String,
}

#[derive(Clone)]
struct Registration {
    flow: Arc<dyn SubFlow>,
    guard: Option<Guard>,
}

impl Registration {
    fn blocked_by(&self, state: &SessionState) -> Option<&str> {
        self.guard
            .as_ref()
            .filter(|guard| !(guard.condition)(state))
            .map(|guard| guard.reason.as_str())
    }
}

/// One press of the "analyze" button
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub input: RawPatientInput,
    pub language: Language,
    #[serde(skip)]
    pub image: Option<ImageAttachment>,
}

impl SubmitRequest {
    pub fn new(input: RawPatientInput) -> Self {
        Self {
            input,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    /// Non-empty symptom text or an attached image
    pub fn has_symptom_source(&self) -> bool {
        !self.input.symptoms.trim().is_empty() || self.image.is_some()
    }
}

/// Summary of a successful submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReport {
    pub urgency: Option<UrgencyLevel>,
    pub emergency_active: bool,
    pub medications: BTreeSet<String>,
    pub warnings: Vec<String>,
}

pub struct DispatchController {
    generator: AssessmentGenerator,
    annotator: Annotator,
    extractor: MedicationExtractor,
    exporter: Arc<dyn DocumentExport>,
    export_timeout: Duration,
    sub_flows: Vec<Registration>,
}

impl DispatchController {
    pub fn builder(
        generator: AssessmentGenerator,
        exporter: Arc<dyn DocumentExport>,
    ) -> DispatchControllerBuilder {
        DispatchControllerBuilder::new(generator, exporter)
    }

    /// Controller wired with the four standard sub-flows
    pub fn standard(collaborators: Collaborators, config: &PipelineConfig) -> Result<Self> {
        let timeouts = &config.timeouts;
        let mut builder = Self::builder(
            AssessmentGenerator::new(collaborators.inference.clone(), timeouts.inference()),
            collaborators.exporter,
        )
        .export_timeout(timeouts.export());

        if let Some(terms) = &config.vocabulary.highlight {
            builder = builder.annotator(Annotator::new(Vocabulary::new(terms)?));
        }
        if let Some(terms) = &config.vocabulary.medications {
            builder = builder.extractor(MedicationExtractor::new(Vocabulary::new(terms)?));
        }

        Ok(builder
            .add_sub_flow(Arc::new(NarrationFlow::new(
                collaborators.narration,
                timeouts.narration(),
            )))
            .add_sub_flow(Arc::new(NutritionPlanFlow::new(
                collaborators.inference,
                timeouts.inference(),
            )))
            .add_sub_flow(Arc::new(PurchaseLookupFlow::new(
                collaborators.products,
                config.purchases.clone(),
                timeouts.search(),
            )))
            .add_guarded_sub_flow(
                Arc::new(EmergencyLookupFlow::new(
                    collaborators.geo,
                    config.emergency.clone(),
                    timeouts.geo(),
                )),
                "the assessment is not an emergency",
                SessionState::emergency_active,
            )
            .build())
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn extractor(&self) -> &MedicationExtractor {
        &self.extractor
    }

    /// Run the primary pipeline for a new submission.
    ///
    /// On any error the state is left as it was before the call.
    pub async fn submit(
        &self,
        state: &mut SessionState,
        request: SubmitRequest,
    ) -> Result<SubmissionReport> {
        if !request.has_symptom_source() {
            warn!("Submission rejected: no symptoms and no image");
            return Err(FlowError::Validation(MISSING_SYMPTOMS_MESSAGE.to_string()));
        }

        let previous = state.begin_submission();
        match self.assess(request).await {
            Ok(completed) => {
                let report = SubmissionReport {
                    urgency: completed.annotated.urgency,
                    emergency_active: completed.assessment.is_emergency(),
                    medications: completed.medications.clone(),
                    warnings: completed.warnings.clone(),
                };
                state.complete_submission(completed);
                info!(
                    urgency = ?report.urgency,
                    emergency = report.emergency_active,
                    medications = report.medications.len(),
                    "Assessment ready"
                );
                Ok(report)
            }
            Err(e) => {
                state.abort_submission(previous);
                error!(error = %e, "Submission failed");
                Err(e)
            }
        }
    }

    async fn assess(&self, request: SubmitRequest) -> Result<CompletedAssessment> {
        let SubmitRequest {
            input,
            language,
            image,
        } = request;
        let mut warnings = Vec::new();
        let mut patient = PatientContext::assemble(&input, None);

        if let Some(image) = &image {
            match self.generator.analyze_image(image).await {
                Ok(description) => patient = patient.with_image_description(description),
                Err(e) if patient.has_symptoms() => {
                    warn!(error = %e, "Continuing without image analysis");
                    warnings.push(e.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let assessment = self.generator.generate(&patient, language).await?;
        let annotated = self.annotator.annotate(assessment.as_str());
        let medications = if assessment.has_medication_section() {
            self.extractor.extract(assessment.as_str())
        } else {
            BTreeSet::new()
        };

        Ok(CompletedAssessment {
            language,
            patient,
            image: image.as_ref().map(ImageAttachment::reference),
            assessment,
            annotated,
            medications,
            warnings,
        })
    }

    /// Sub-flows the current state allows, in registration order
    pub fn available_sub_flows(&self, state: &SessionState) -> Vec<&str> {
        if state.phase() != Phase::ResultsShown {
            return Vec::new();
        }
        self.sub_flows
            .iter()
            .filter(|registration| registration.blocked_by(state).is_none())
            .map(|registration| registration.flow.id())
            .collect()
    }

    pub async fn run_sub_flow(
        &self,
        id: &str,
        state: &mut SessionState,
        input: &SubFlowInput,
    ) -> Result<SubFlowOutcome> {
        let registration = self
            .sub_flows
            .iter()
            .find(|registration| registration.flow.id() == id)
            .ok_or_else(|| FlowError::SubFlowNotFound(id.to_string()))?;

        if state.phase() != Phase::ResultsShown {
            return Err(FlowError::SubFlowUnavailable {
                id: id.to_string(),
                reason: "no assessment results are shown".to_string(),
            });
        }
        if let Some(reason) = registration.blocked_by(state) {
            return Err(FlowError::SubFlowUnavailable {
                id: id.to_string(),
                reason: reason.to_string(),
            });
        }

        info!(sub_flow = %id, "Running sub-flow");
        let mut outcome = registration.flow.run(state, input).await?;
        outcome.sub_flow = id.to_string();

        for warning in &outcome.warnings {
            warn!(sub_flow = %id, warning = %warning, "Sub-flow degraded");
        }
        Ok(outcome)
    }

    /// The stored nutrition plan, stripped of markup and rendered as a document
    pub async fn export_nutrition_plan(&self, state: &SessionState) -> Result<Vec<u8>> {
        let plan = state
            .nutrition_plan()
            .ok_or_else(|| FlowError::SubFlowUnavailable {
                id: "nutrition_export".to_string(),
                reason: "no nutrition plan has been generated".to_string(),
            })?;
        let plain = strip_markup(plan);

        let exporter = self.exporter.clone();
        let render = async move {
            tokio::task::spawn_blocking(move || exporter.render(&plain))
                .await
                .map_err(|e| ServiceError::Request(format!("export task failed: {e}")))?
        };
        let bytes = bounded(self.export_timeout, render)
            .await
            .map_err(FlowError::ExportFailed)?;

        info!(bytes = bytes.len(), "Nutrition plan exported");
        Ok(bytes)
    }
}

/// Remove every `<...>` tag, keeping the text between them
pub fn strip_markup(text: &str) -> String {
    MARKUP_TAG.replace_all(text, "").into_owned()
}

/// Builder for [`DispatchController`]
pub struct DispatchControllerBuilder {
    generator: AssessmentGenerator,
    annotator: Annotator,
    extractor: MedicationExtractor,
    exporter: Arc<dyn DocumentExport>,
    export_timeout: Duration,
    sub_flows: Vec<Registration>,
}

impl DispatchControllerBuilder {
    pub fn new(generator: AssessmentGenerator, exporter: Arc<dyn DocumentExport>) -> Self {
        Self {
            generator,
            annotator: Annotator::default(),
            extractor: MedicationExtractor::default(),
            exporter,
            export_timeout: Duration::from_secs(15),
            sub_flows: Vec::new(),
        }
    }

    pub fn annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn extractor(mut self, extractor: MedicationExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    pub fn add_sub_flow(mut self, flow: Arc<dyn SubFlow>) -> Self {
        self.sub_flows.push(Registration { flow, guard: None });
        self
    }

    /// Register a sub-flow that is only offered while `condition` holds
    pub fn add_guarded_sub_flow<F>(
        mut self,
        flow: Arc<dyn SubFlow>,
        reason: impl Into<String>,
        condition: F,
    ) -> Self
    where
        F: Fn(&SessionState) -> bool + Send + Sync + 'static,
    {
        self.sub_flows.push(Registration {
            flow,
            guard: Some(Guard {
                condition: Arc::new(condition),
                reason: reason.into(),
            }),
        });
        self
    }

    pub fn build(self) -> DispatchController {
        DispatchController {
            generator: self.generator,
            annotator: self.annotator,
            extractor: self.extractor,
            exporter: self.exporter,
            export_timeout: self.export_timeout,
            sub_flows: self.sub_flows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_stripped_but_text_kept() {
        assert_eq!(
            strip_markup("<h4 style=\"color:red\">🥗 Plan</h4><b>Oats</b> & <i>fruit</i>"),
            "🥗 PlanOats & fruit"
        );
        assert_eq!(strip_markup("no tags"), "no tags");
    }

    #[test]
    fn blank_symptoms_without_image_is_not_a_source() {
        let request = SubmitRequest::new(RawPatientInput {
            symptoms: "   ".into(),
            ..Default::default()
        });
        assert!(!request.has_symptom_source());

        let with_image = request.with_image(ImageAttachment::new(None, "image/png", vec![1, 2]));
        assert!(with_image.has_symptom_source());
    }
}
