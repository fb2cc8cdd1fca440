use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use triage_flow::{
    ImageAttachment, Language, Phase, RawPatientInput, Session, SubmissionReport, SubmitRequest,
    UrgencyLevel, input::ImageReference, subflows::MedicationPurchases,
};

/// Uploaded symptom photo, base64 encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub file_name: Option<String>,
    pub data_base64: String,
}

impl ImagePayload {
    /// Decode and accept JPEG, PNG and WebP only
    pub fn into_attachment(self) -> Result<ImageAttachment, String> {
        let data = STANDARD
            .decode(self.data_base64.trim())
            .map_err(|e| format!("Image is not valid base64: {e}"))?;
        let media_type = match image::guess_format(&data) {
            Ok(ImageFormat::Jpeg) => "image/jpeg",
            Ok(ImageFormat::Png) => "image/png",
            Ok(ImageFormat::WebP) => "image/webp",
            _ => return Err("Unsupported image format; use JPG, JPEG, PNG or WebP".to_string()),
        };
        Ok(ImageAttachment::new(self.file_name, media_type, data))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentRequest {
    #[serde(flatten)]
    pub patient: RawPatientInput,
    pub language: Language,
    pub image: Option<ImagePayload>,
}

impl AssessmentRequest {
    pub fn into_submit_request(self) -> Result<SubmitRequest, String> {
        let mut request = SubmitRequest::new(self.patient).with_language(self.language);
        if let Some(image) = self.image {
            request = request.with_image(image.into_attachment()?);
        }
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentResponse {
    pub session_id: String,
    pub report: SubmissionReport,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub phase: Phase,
    pub status_message: Option<String>,
    pub language: Language,
    pub urgency: Option<UrgencyLevel>,
    pub assessment: Option<String>,
    pub annotated_html: Option<String>,
    pub medications: BTreeSet<String>,
    pub emergency_active: bool,
    pub audio_generated: bool,
    pub nutrition_plan: Option<String>,
    pub purchases: Option<Vec<MedicationPurchases>>,
    pub image: Option<ImageReference>,
    pub warnings: Vec<String>,
    pub available_sub_flows: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionResponse {
    pub fn new(session: &Session, available_sub_flows: Vec<String>) -> Self {
        let state = &session.state;
        Self {
            session_id: session.id.clone(),
            phase: state.phase(),
            status_message: session.status_message.clone(),
            language: state.language(),
            urgency: state.annotated().and_then(|a| a.urgency),
            assessment: state.assessment().map(|a| a.as_str().to_string()),
            annotated_html: state.annotated().map(|a| a.html.clone()),
            medications: state.medications().clone(),
            emergency_active: state.emergency_active(),
            audio_generated: state.audio_generated(),
            nutrition_plan: state.nutrition_plan().map(str::to_string),
            purchases: state.purchases().map(<[_]>::to_vec),
            image: state.image_reference().cloned(),
            warnings: state.warnings().to_vec(),
            available_sub_flows,
            submitted_at: state.submitted_at(),
            created_at: session.created_at,
        }
    }
}
