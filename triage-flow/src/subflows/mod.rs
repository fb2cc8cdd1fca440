use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, language::Language, session::SessionState};

pub mod emergency;
pub mod narration;
pub mod nutrition;
pub mod purchase;

pub use emergency::{EmergencyLookupFlow, EmergencyLookupResult};
pub use narration::{AudioClip, NarrationFlow};
pub use nutrition::NutritionPlanFlow;
pub use purchase::{MedicationPurchases, PurchaseLookupFlow, PurchaseOption};

/// Per-invocation parameters a user can pass to a sub-flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubFlowInput {
    /// Overrides the session language (narration)
    pub language: Option<Language>,
    /// Address or place name (emergency lookup)
    pub location: Option<String>,
}

/// What a sub-flow produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubFlowOutput {
    Narration(AudioClip),
    Nutrition { plan: String },
    Purchases { medications: Vec<MedicationPurchases> },
    Emergency(EmergencyLookupResult),
}

/// Result of a sub-flow execution
#[derive(Debug, Clone, Serialize)]
pub struct SubFlowOutcome {
    /// Set by the dispatcher to the id of the sub-flow that ran
    pub sub_flow: String,
    pub output: SubFlowOutput,
    /// Collaborator failures that were degraded to "no data"
    pub warnings: Vec<String>,
    pub status_message: Option<String>,
}

impl SubFlowOutcome {
    pub fn new(output: SubFlowOutput) -> Self {
        Self {
            sub_flow: String::new(),
            output,
            warnings: Vec::new(),
            status_message: None,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_status(mut self, status_message: impl Into<String>) -> Self {
        self.status_message = Some(status_message.into());
        self
    }
}

/// An optional, user-triggered extension of a completed assessment.
///
/// Sub-flows never change the primary assessment; they may only fill in their own optional
/// fields of the [`SessionState`].
#[async_trait]
pub trait SubFlow: Send + Sync {
    /// Unique identifier for this sub-flow
    fn id(&self) -> &str;

    async fn run(&self, state: &mut SessionState, input: &SubFlowInput) -> Result<SubFlowOutcome>;
}

/// The assessment every sub-flow starts from
pub(crate) fn require_assessment<'s>(
    state: &'s SessionState,
    sub_flow: &str,
) -> Result<&'s crate::generator::AssessmentText> {
    state
        .assessment()
        .ok_or_else(|| crate::error::FlowError::SubFlowUnavailable {
            id: sub_flow.to_string(),
            reason: "no assessment has been generated yet".to_string(),
        })
}
