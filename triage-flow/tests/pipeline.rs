use async_trait::async_trait;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use triage_flow::{
    Collaborators, Coordinates, DispatchController, DocumentExport, Facility, FlowError,
    GenerationError, GeoService, ImageAttachment, InferenceService, Language, NarrationService,
    NearbyQuery, Phase, PipelineConfig, ProductSearch, RawPatientInput, SearchHit, ServiceError,
    SessionState, SubFlowInput, SubFlowOutput, SubmitRequest, UrgencyLevel,
};

const EMERGENCY_ANSWER: &str = "1. Possible Conditions: Acute chest pain\n\
Urgency Level: Emergency\n\
### Medication Recommendations:\n\
- Take paracetamol 500mg twice daily until you reach the hospital.";

const SELF_CARE_ANSWER: &str = "Urgency Level: Self-care\n\
### Medication Recommendations:\n\
- Ibuprofen 400mg every 8 hours with food\n\
- Cetirizine 10mg at night";

/// Answers prompts in order and counts every call
struct ScriptedModel {
    answers: Mutex<Vec<std::result::Result<String, ServiceError>>>,
    calls: AtomicUsize,
    vision: std::result::Result<String, ServiceError>,
}

impl ScriptedModel {
    fn scripted(
        answers: Vec<std::result::Result<&str, ServiceError>>,
        vision: std::result::Result<String, ServiceError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .rev()
                    .map(|a| a.map(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            vision,
        })
    }

    fn new(answers: Vec<std::result::Result<&str, ServiceError>>) -> Arc<Self> {
        Self::scripted(
            answers,
            Ok("Swollen, red skin around a small wound".to_string()),
        )
    }

    fn with_failing_vision(answers: Vec<std::result::Result<&str, ServiceError>>) -> Arc<Self> {
        Self::scripted(
            answers,
            Err(ServiceError::Request("vision model offline".into())),
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceService for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ServiceError::Request("no scripted answer".into())))
    }

    async fn generate_with_image(
        &self,
        _prompt: &str,
        _image: &ImageAttachment,
    ) -> std::result::Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vision.clone()
    }
}

struct FakeGeo {
    calls: AtomicUsize,
}

#[async_trait]
impl GeoService for FakeGeo {
    async fn geocode(&self, _address: &str) -> std::result::Result<Option<Coordinates>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Coordinates {
            lat: 17.385,
            lng: 78.4867,
        }))
    }

    async fn nearby_search(
        &self,
        _query: &NearbyQuery,
    ) -> std::result::Result<Vec<Facility>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Facility {
            name: Some("City General Hospital".into()),
            rating: Some(4.2),
            address: Some("MG Road".into()),
            business_status: Some("OPERATIONAL".into()),
            location: Some(Coordinates {
                lat: 17.39,
                lng: 78.49,
            }),
        }])
    }
}

struct FakeNarration {
    fail: bool,
}

#[async_trait]
impl NarrationService for FakeNarration {
    async fn synthesize(
        &self,
        _text: &str,
        language_code: &str,
        _region_variant: &str,
    ) -> std::result::Result<Vec<u8>, ServiceError> {
        if self.fail {
            Err(ServiceError::Request("speech endpoint returned 503".into()))
        } else {
            Ok(format!("ID3-{language_code}").into_bytes())
        }
    }
}

/// Search index keyed by the first word of the query
struct FakeSearch {
    index: HashMap<&'static str, Vec<&'static str>>,
    /// Medications whose search errors out
    failing: Vec<&'static str>,
}

#[async_trait]
impl ProductSearch for FakeSearch {
    async fn search(&self, query: &str, _limit: usize) -> std::result::Result<Vec<SearchHit>, ServiceError> {
        let medication = query.split_whitespace().next().unwrap_or_default();
        if self.failing.iter().any(|failing| *failing == medication) {
            return Err(ServiceError::Request(format!("search quota exhausted for {medication}")));
        }
        Ok(self
            .index
            .get(medication)
            .map(|urls| {
                urls.iter()
                    .map(|url| SearchHit {
                        url: url.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct TextExport;

impl DocumentExport for TextExport {
    fn render(&self, plain_text: &str) -> std::result::Result<Vec<u8>, ServiceError> {
        Ok(plain_text.as_bytes().to_vec())
    }
}

struct Harness {
    model: Arc<ScriptedModel>,
    geo: Arc<FakeGeo>,
    controller: DispatchController,
}

fn harness_with(model: Arc<ScriptedModel>, narration_fails: bool) -> Harness {
    let geo = Arc::new(FakeGeo {
        calls: AtomicUsize::new(0),
    });
    let collaborators = Collaborators {
        inference: model.clone(),
        geo: geo.clone(),
        narration: Arc::new(FakeNarration {
            fail: narration_fails,
        }),
        products: Arc::new(FakeSearch {
            index: HashMap::from([(
                "ibuprofen",
                vec![
                    "https://www.1mg.com/otc/ibuprofen-400",
                    "https://pharmeasy.in/ibuprofen",
                    "https://www.netmeds.com/ibuprofen",
                    "https://www.apollopharmacy.in/ibuprofen",
                ],
            )]),
            failing: vec!["paracetamol"],
        }),
        exporter: Arc::new(TextExport),
    };
    let controller = DispatchController::standard(collaborators, &PipelineConfig::default()).unwrap();
    Harness {
        model,
        geo,
        controller,
    }
}

fn harness(answers: Vec<std::result::Result<&str, ServiceError>>) -> Harness {
    harness_with(ScriptedModel::new(answers), false)
}

fn symptoms(text: &str) -> SubmitRequest {
    SubmitRequest::new(RawPatientInput {
        symptoms: text.into(),
        age: Some(45),
        ..Default::default()
    })
}

#[tokio::test]
async fn empty_submission_is_rejected_before_any_call() {
    let h = harness(vec![Ok(SELF_CARE_ANSWER)]);
    let mut state = SessionState::new();

    let err = h
        .controller
        .submit(&mut state, symptoms("   "))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Validation(_)));
    assert_eq!(h.model.calls(), 0);
    assert_eq!(state.phase(), Phase::Empty);
}

#[tokio::test]
async fn emergency_assessment_scenario() {
    let h = harness(vec![Ok(EMERGENCY_ANSWER)]);
    let mut state = SessionState::new();

    let report = h
        .controller
        .submit(&mut state, symptoms("Crushing chest pain"))
        .await
        .unwrap();

    assert!(report.emergency_active);
    assert!(state.emergency_active());
    assert_eq!(report.urgency, Some(UrgencyLevel::Emergency));
    assert_eq!(
        state.medications(),
        &BTreeSet::from(["paracetamol".to_string()])
    );

    let html = &state.annotated().unwrap().html;
    assert!(html.contains(r#"<span style="font-weight:bold; color:#0066cc">500mg</span>"#));
    assert!(html.contains(r#"<span style="color:red; font-weight:bold">Urgency Level: Emergency</span>"#));
    assert!(html.contains("💊 Medication Recommendations:"));
    assert!(
        h.controller
            .available_sub_flows(&state)
            .contains(&"emergency")
    );

    let input = SubFlowInput {
        location: Some("Hyderabad".into()),
        ..Default::default()
    };
    let outcome = h
        .controller
        .run_sub_flow("emergency", &mut state, &input)
        .await
        .unwrap();
    match outcome.output {
        SubFlowOutput::Emergency(result) => {
            assert_eq!(result.summary.len(), 1);
            assert_eq!(result.summary[0].name, "City General Hospital");
            assert_eq!(result.contacts.len(), 3);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn emergency_lookup_is_guarded() {
    let h = harness(vec![Ok(SELF_CARE_ANSWER)]);
    let mut state = SessionState::new();
    h.controller
        .submit(&mut state, symptoms("Runny nose"))
        .await
        .unwrap();

    assert_eq!(
        h.controller.available_sub_flows(&state),
        vec!["narration", "nutrition", "purchases"]
    );

    let input = SubFlowInput {
        location: Some("Hyderabad".into()),
        ..Default::default()
    };
    let err = h
        .controller
        .run_sub_flow("emergency", &mut state, &input)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::SubFlowUnavailable { .. }));
    assert_eq!(h.geo.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn medications_are_not_extracted_without_the_section_header() {
    let h = harness(vec![Ok("Urgency Level: Self-care\nIbuprofen may help.")]);
    let mut state = SessionState::new();

    let report = h
        .controller
        .submit(&mut state, symptoms("Mild headache"))
        .await
        .unwrap();

    assert!(report.medications.is_empty());
    assert!(state.annotated().unwrap().html.contains("background-color"));
}

#[tokio::test]
async fn new_submission_clears_nutrition_plan() {
    let h = harness(vec![
        Ok(SELF_CARE_ANSWER),
        Ok("<h3>🥗 Eat oats</h3> and drink water"),
        Ok(SELF_CARE_ANSWER),
    ]);
    let mut state = SessionState::new();

    h.controller
        .submit(&mut state, symptoms("Sore throat"))
        .await
        .unwrap();
    h.controller
        .run_sub_flow("nutrition", &mut state, &SubFlowInput::default())
        .await
        .unwrap();
    assert!(state.nutrition_available());

    let pdf = h.controller.export_nutrition_plan(&state).await.unwrap();
    assert_eq!(pdf, "🥗 Eat oats and drink water".as_bytes());

    h.controller
        .submit(&mut state, symptoms("Sore throat, now with fever"))
        .await
        .unwrap();
    assert!(!state.nutrition_available());
    assert!(matches!(
        h.controller.export_nutrition_plan(&state).await,
        Err(FlowError::SubFlowUnavailable { .. })
    ));
}

#[tokio::test]
async fn narration_failure_leaves_state_unchanged() {
    let h = harness_with(ScriptedModel::new(vec![Ok(EMERGENCY_ANSWER)]), true);
    let mut state = SessionState::new();
    h.controller
        .submit(&mut state, symptoms("Chest pain"))
        .await
        .unwrap();
    let before = (
        state.assessment().cloned(),
        state.annotated().cloned(),
        state.emergency_active(),
        state.audio_generated(),
    );

    let err = h
        .controller
        .run_sub_flow("narration", &mut state, &SubFlowInput::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::SubFlowFailed { .. }));
    let after = (
        state.assessment().cloned(),
        state.annotated().cloned(),
        state.emergency_active(),
        state.audio_generated(),
    );
    assert_eq!(before, after);
}

#[tokio::test]
async fn narration_uses_the_requested_language() {
    let h = harness(vec![Ok(SELF_CARE_ANSWER)]);
    let mut state = SessionState::new();
    h.controller
        .submit(&mut state, symptoms("Cough"))
        .await
        .unwrap();

    let input = SubFlowInput {
        language: Some(Language::Telugu),
        ..Default::default()
    };
    let outcome = h
        .controller
        .run_sub_flow("narration", &mut state, &input)
        .await
        .unwrap();

    match outcome.output {
        SubFlowOutput::Narration(clip) => {
            assert_eq!(clip.language, Language::Telugu);
            assert_eq!(clip.byte_len, "ID3-te".len());
        }
        other => panic!("unexpected output: {other:?}"),
    }
    assert!(state.audio_generated());
}

#[tokio::test]
async fn purchase_miss_does_not_hide_other_results() {
    let h = harness(vec![Ok(SELF_CARE_ANSWER)]);
    let mut state = SessionState::new();
    h.controller
        .submit(&mut state, symptoms("Body ache and sneezing"))
        .await
        .unwrap();

    let outcome = h
        .controller
        .run_sub_flow("purchases", &mut state, &SubFlowInput::default())
        .await
        .unwrap();

    let SubFlowOutput::Purchases { medications } = outcome.output else {
        panic!("unexpected output");
    };
    assert_eq!(medications.len(), 2);

    let cetirizine = &medications[0];
    assert_eq!(cetirizine.medication, "cetirizine");
    assert!(cetirizine.options.is_empty());

    let ibuprofen = &medications[1];
    assert_eq!(ibuprofen.options.len(), 3);
    assert_eq!(ibuprofen.options[0].display_name, "Ibuprofen from www.1mg.com");

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(state.purchases().map(<[_]>::len), Some(2));
}

#[tokio::test]
async fn purchase_search_error_is_confined_to_its_medication() {
    let h = harness(vec![Ok("Urgency Level: Self-care\n\
### Medication Recommendations:\n\
- Paracetamol 500mg every 6 hours\n\
- Ibuprofen 400mg with food")]);
    let mut state = SessionState::new();
    h.controller
        .submit(&mut state, symptoms("Fever and body ache"))
        .await
        .unwrap();

    let outcome = h
        .controller
        .run_sub_flow("purchases", &mut state, &SubFlowInput::default())
        .await
        .unwrap();

    let SubFlowOutput::Purchases { medications } = outcome.output else {
        panic!("unexpected output");
    };
    let names: Vec<_> = medications.iter().map(|m| m.medication.as_str()).collect();
    assert_eq!(names, vec!["ibuprofen", "paracetamol"]);
    assert_eq!(medications[0].options.len(), 3);
    assert!(medications[1].options.is_empty());

    assert_eq!(
        outcome.warnings,
        vec!["Could not find purchase options for paracetamol. Please check local pharmacies."]
    );
    assert_eq!(state.purchases().map(<[_]>::len), Some(2));
}

#[tokio::test]
async fn failed_generation_keeps_previous_results() {
    let h = harness(vec![
        Ok(SELF_CARE_ANSWER),
        Err(ServiceError::Request("rate limited".into())),
    ]);
    let mut state = SessionState::new();
    h.controller
        .submit(&mut state, symptoms("Cough"))
        .await
        .unwrap();

    let err = h
        .controller
        .submit(&mut state, symptoms("Cough and fever"))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Error generating response:"));
    assert!(matches!(
        err,
        FlowError::Generation(GenerationError::Assessment(_))
    ));
    assert_eq!(state.phase(), Phase::ResultsShown);
    assert_eq!(state.assessment().unwrap().as_str(), SELF_CARE_ANSWER);
}

#[tokio::test]
async fn image_analysis_failure_degrades_to_warning() {
    let h = harness_with(
        ScriptedModel::with_failing_vision(vec![Ok(SELF_CARE_ANSWER)]),
        false,
    );
    let mut state = SessionState::new();
    let image = ImageAttachment::new(Some("rash.png".into()), "image/png", vec![0x89, 0x50]);

    let report = h
        .controller
        .submit(&mut state, symptoms("Itchy rash").with_image(image.clone()))
        .await
        .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("Error analyzing image:"));
    assert_eq!(state.image_reference().unwrap().file_name.as_deref(), Some("rash.png"));

    let err = h
        .controller
        .submit(&mut state, symptoms("").with_image(image))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Generation(GenerationError::ImageAnalysis(_))
    ));
}
