use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use uuid::Uuid;

use crate::{
    annotate::AnnotatedAssessment,
    error::Result,
    generator::AssessmentText,
    input::{ImageReference, PatientContext},
    language::Language,
    subflows::purchase::MedicationPurchases,
};

/// Pipeline progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Empty,
    Submitted,
    ResultsShown,
}

/// Everything one interactive session knows about its latest assessment.
///
/// Owned by exactly one [`Session`]; mutated only through the transitions below. A new
/// submission replaces the whole record, sub-flows only fill in their own optional fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    phase: Phase,
    language: Language,
    patient: Option<PatientContext>,
    assessment: Option<AssessmentText>,
    annotated: Option<AnnotatedAssessment>,
    medications: BTreeSet<String>,
    emergency_active: bool,
    nutrition_plan: Option<String>,
    image: Option<ImageReference>,
    audio_generated: bool,
    purchases: Option<Vec<MedicationPurchases>>,
    results_visible: bool,
    submitted_at: Option<DateTime<Utc>>,
    warnings: Vec<String>,
}

/// Output of a successful generate step, applied in one piece
#[derive(Debug, Clone)]
pub(crate) struct CompletedAssessment {
    pub language: Language,
    pub patient: PatientContext,
    pub image: Option<ImageReference>,
    pub assessment: AssessmentText,
    pub annotated: AnnotatedAssessment,
    pub medications: BTreeSet<String>,
    pub warnings: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn patient(&self) -> Option<&PatientContext> {
        self.patient.as_ref()
    }

    pub fn assessment(&self) -> Option<&AssessmentText> {
        self.assessment.as_ref()
    }

    pub fn annotated(&self) -> Option<&AnnotatedAssessment> {
        self.annotated.as_ref()
    }

    pub fn medications(&self) -> &BTreeSet<String> {
        &self.medications
    }

    pub fn emergency_active(&self) -> bool {
        self.emergency_active
    }

    pub fn nutrition_plan(&self) -> Option<&str> {
        self.nutrition_plan.as_deref()
    }

    pub fn nutrition_available(&self) -> bool {
        self.nutrition_plan.is_some()
    }

    /// The uploaded photo's metadata; the bytes are dropped once analyzed
    pub fn image_reference(&self) -> Option<&ImageReference> {
        self.image.as_ref()
    }

    pub fn audio_generated(&self) -> bool {
        self.audio_generated
    }

    pub fn purchases(&self) -> Option<&[MedicationPurchases]> {
        self.purchases.as_deref()
    }

    pub fn results_visible(&self) -> bool {
        self.results_visible
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Degradations recorded during the last submission
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Enter `Submitted`, returning the phase to restore if generation fails.
    pub(crate) fn begin_submission(&mut self) -> Phase {
        std::mem::replace(&mut self.phase, Phase::Submitted)
    }

    pub(crate) fn abort_submission(&mut self, previous: Phase) {
        self.phase = previous;
    }

    /// `Submitted -> ResultsShown`: overwrite the record wholesale.
    pub(crate) fn complete_submission(&mut self, completed: CompletedAssessment) {
        let emergency_active = completed.assessment.is_emergency();
        *self = SessionState {
            phase: Phase::ResultsShown,
            language: completed.language,
            patient: Some(completed.patient),
            assessment: Some(completed.assessment),
            annotated: Some(completed.annotated),
            medications: completed.medications,
            emergency_active,
            nutrition_plan: None,
            image: completed.image,
            audio_generated: false,
            purchases: None,
            results_visible: true,
            submitted_at: Some(Utc::now()),
            warnings: completed.warnings,
        };
    }

    pub fn record_nutrition_plan(&mut self, plan: impl Into<String>) {
        self.nutrition_plan = Some(plan.into());
    }

    pub fn mark_audio_generated(&mut self) {
        self.audio_generated = true;
    }

    pub fn record_purchases(&mut self, purchases: Vec<MedicationPurchases>) {
        self.purchases = Some(purchases);
    }
}

/// Session information
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last successful change; idle eviction is measured from here
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: SessionState::new(),
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Remove sessions not updated since `cutoff`, returning their ids
    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;
}

/// In-memory implementation of SessionStorage; sessions end with the process
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn evict_idle(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            let keep = session.updated_at >= cutoff;
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });
        Ok(evicted)
    }
}
