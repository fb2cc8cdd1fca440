use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;
use tracing::{error, info};

use super::{SubFlow, SubFlowInput, SubFlowOutcome, SubFlowOutput, require_assessment};
use crate::{
    error::{FlowError, Result},
    language::Language,
    services::{NarrationService, bounded},
    session::SessionState,
};

pub const NARRATION: &str = "narration";

/// Spoken rendering of the assessment, ready for playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub media_type: String,
    pub language: Language,
    pub byte_len: usize,
    pub audio_base64: String,
}

pub struct NarrationFlow {
    service: Arc<dyn NarrationService>,
    timeout: Duration,
}

impl NarrationFlow {
    pub fn new(service: Arc<dyn NarrationService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }
}

#[async_trait]
impl SubFlow for NarrationFlow {
    fn id(&self) -> &str {
        NARRATION
    }

    async fn run(&self, state: &mut SessionState, input: &SubFlowInput) -> Result<SubFlowOutcome> {
        let language = input.language.unwrap_or_else(|| state.language());
        let text = require_assessment(state, self.id())?.as_str();

        info!(
            language = language.name(),
            text_chars = text.len(),
            "Synthesizing narration"
        );

        let audio = bounded(
            self.timeout,
            self.service
                .synthesize(text, language.speech_code(), language.speech_region()),
        )
        .await
        .map_err(|source| {
            error!(error = %source, "Text-to-speech failed");
            FlowError::SubFlowFailed {
                id: NARRATION.to_string(),
                source,
            }
        })?;

        let clip = AudioArtifact::persist(&audio).await?.deliver(language).await?;
        state.mark_audio_generated();

        info!(bytes = clip.byte_len, "Narration delivered");
        Ok(SubFlowOutcome::new(SubFlowOutput::Narration(clip)).with_status("Audio narration ready"))
    }
}

/// Temporary MP3 file backing exactly one playback
struct AudioArtifact {
    dir: TempDir,
    path: PathBuf,
}

impl AudioArtifact {
    async fn persist(audio: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("output.mp3");
        tokio::fs::write(&path, audio).await?;
        Ok(Self { dir, path })
    }

    /// Reads the clip and removes the file along with its directory, whether or not the
    /// read succeeded.
    async fn deliver(self, language: Language) -> std::io::Result<AudioClip> {
        let read = tokio::fs::read(&self.path).await;
        let removed = self.dir.close();
        let bytes = read?;
        removed?;

        Ok(AudioClip {
            media_type: "audio/mpeg".to_string(),
            language,
            byte_len: bytes.len(),
            audio_base64: STANDARD.encode(&bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn artifact_is_removed_after_delivery() {
        let artifact = AudioArtifact::persist(b"ID3fake-mp3").await.unwrap();
        let dir = artifact.dir.path().to_path_buf();
        assert!(artifact.path.exists());

        let clip = artifact.deliver(Language::Hindi).await.unwrap();

        assert!(!dir.exists());
        assert_eq!(clip.byte_len, 11);
        assert_eq!(clip.language, Language::Hindi);
        assert_eq!(STANDARD.decode(clip.audio_base64).unwrap(), b"ID3fake-mp3");
    }

    #[tokio::test]
    async fn artifact_is_removed_when_the_read_fails() {
        let artifact = AudioArtifact::persist(b"abc").await.unwrap();
        let dir = artifact.dir.path().to_path_buf();
        std::fs::remove_file(&artifact.path).unwrap();

        assert!(artifact.deliver(Language::English).await.is_err());
        assert!(!dir.exists());
    }
}
