use serde::{Deserialize, Serialize};

/// Output language for assessments and narration. Unknown names fall back to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Language {
    #[default]
    English,
    Hindi,
    Telugu,
}

impl Language {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "hindi" | "hi" => Language::Hindi,
            "telugu" | "te" => Language::Telugu,
            _ => Language::English,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Telugu => "Telugu",
        }
    }

    /// Prompt directive controlling the language of the model's answer
    pub fn directive(self) -> &'static str {
        match self {
            Language::English => "Provide all recommendations in English.",
            Language::Hindi => "Provide all recommendations in Hindi (हिंदी में).",
            Language::Telugu => "Provide all recommendations in Telugu (తెలుగులో).",
        }
    }

    pub fn speech_code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Telugu => "te",
        }
    }

    /// Regional voice variant (top-level domain of the speech endpoint)
    pub fn speech_region(self) -> &'static str {
        match self {
            Language::English => "com",
            Language::Hindi | Language::Telugu => "co.in",
        }
    }
}

impl From<String> for Language {
    fn from(name: String) -> Self {
        Language::from_name(&name)
    }
}
