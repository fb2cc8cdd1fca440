use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, info};
use triage_flow::{NarrationService, ServiceError};

/// Longest text the endpoint accepts per request
pub const MAX_CHUNK_CHARS: usize = 200;

/// Google Translate's speech endpoint; the region variant selects the `translate.google.<tld>`
/// host and with it the regional voice.
pub struct TranslateSpeech {
    http: reqwest::Client,
}

impl TranslateSpeech {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language_code: &str,
        region_variant: &str,
        idx: usize,
        total: usize,
    ) -> anyhow::Result<Vec<u8>> {
        let url = format!(
            "https://translate.google.{}/translate_tts?ie=UTF-8&client=tw-ob&tl={}&q={}&total={}&idx={}&textlen={}",
            region_variant,
            urlencoding::encode(language_code),
            urlencoding::encode(chunk),
            total,
            idx,
            chunk.chars().count()
        );

        let response = self
            .http
            .get(&url)
            .header("Referer", format!("https://translate.google.{region_variant}/"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("speech request failed: {}", response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl NarrationService for TranslateSpeech {
    async fn synthesize(
        &self,
        text: &str,
        language_code: &str,
        region_variant: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(ServiceError::InvalidResponse("nothing to narrate".to_string()));
        }

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            debug!(idx, chars = chunk.chars().count(), "Fetching speech chunk");
            let bytes = self
                .fetch_chunk(chunk, language_code, region_variant, idx, chunks.len())
                .await?;
            audio.extend_from_slice(&bytes);
        }

        info!(
            language = language_code,
            chunks = chunks.len(),
            bytes = audio.len(),
            "Speech synthesized"
        );
        Ok(audio)
    }
}

/// Split on whitespace into chunks of at most `max_chars` characters. A single word longer
/// than the limit is cut at character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let word_len = word.len();
        if word_len == 0 {
            continue;
        }
        let needed = if current_len == 0 { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word);
        current_len += word_len;
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}
