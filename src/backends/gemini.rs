//! Extraction of inline audio from a Gemini `generateContent` response body.

use crate::error::BackendError;
use crate::transport::EncodedPayload;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineAudio>,
}

/// The `inlineData` blob of the first candidate part.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineAudio {
    #[serde(default)]
    pub mime_type: String,
    pub data: EncodedPayload,
}

impl InlineAudio {
    /// Sample rate from a mime type such as `audio/L16;codec=pcm;rate=24000`.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }
}

/// Pulls `candidates[0].content.parts[0].inlineData` out of the body.
pub fn inline_audio(body: Value) -> Result<InlineAudio, BackendError> {
    let response: GenerateContentResponse = serde_json::from_value(body)?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.inline_data)
        .filter(|audio| !audio.data.is_empty())
        .ok_or(BackendError::MissingAudio)
}
