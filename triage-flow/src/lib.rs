pub mod annotate;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod generator;
pub mod input;
pub mod language;
pub mod runner;
pub mod services;
pub mod session;
pub mod subflows;
pub mod vocabulary;

// Re-export commonly used types
pub use annotate::{AnnotatedAssessment, Annotator, UrgencyLevel};
pub use config::PipelineConfig;
pub use dispatch::{DispatchController, DispatchControllerBuilder, SubmissionReport, SubmitRequest};
pub use error::{FlowError, Result};
pub use extract::{MedicationExtractor, extract_medications};
pub use generator::{AssessmentGenerator, AssessmentText, GenerationError};
pub use input::{ImageAttachment, PatientContext, RawPatientInput};
pub use language::Language;
pub use runner::FlowRunner;
pub use services::{
    Collaborators, Coordinates, DocumentExport, Facility, GeoService, InferenceService,
    NarrationService, NearbyQuery, ProductSearch, SearchHit, ServiceError,
};
pub use session::{InMemorySessionStorage, Phase, Session, SessionState, SessionStorage};
pub use subflows::{SubFlow, SubFlowInput, SubFlowOutcome, SubFlowOutput};
pub use vocabulary::Vocabulary;
