pub mod gemini;

use crate::error::BackendError;
use crate::transport::EncodedPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents a text-to-speech voice
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// The fixed set of prebuilt voices the TTS collaborator accepts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum VoicePreset {
    Kore,
    #[default]
    Puck,
    Charon,
    Fenrir,
    Zephyr,
}

impl VoicePreset {
    pub const ALL: [VoicePreset; 5] = [
        VoicePreset::Kore,
        VoicePreset::Puck,
        VoicePreset::Charon,
        VoicePreset::Fenrir,
        VoicePreset::Zephyr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VoicePreset::Kore => "Kore",
            VoicePreset::Puck => "Puck",
            VoicePreset::Charon => "Charon",
            VoicePreset::Fenrir => "Fenrir",
            VoicePreset::Zephyr => "Zephyr",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            VoicePreset::Kore => "Firm",
            VoicePreset::Puck => "Upbeat",
            VoicePreset::Charon => "Informative",
            VoicePreset::Fenrir => "Excitable",
            VoicePreset::Zephyr => "Bright",
        }
    }
}

impl fmt::Display for VoicePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VoicePreset {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoicePreset::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BackendError::UnknownVoice(s.to_string()))
    }
}

/// Returns the supported voices
pub fn list_voices() -> Vec<Voice> {
    VoicePreset::ALL
        .iter()
        .map(|v| Voice {
            id: v.name().to_string(),
            name: v.name().to_string(),
            description: v.description().to_string(),
        })
        .collect()
}

/// What the TTS collaborator hands over: a base64 payload and the voice it
/// was rendered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisResponse {
    pub payload: EncodedPayload,
    pub voice: VoicePreset,
}

/// Parses a captured response.
///
/// Accepts either the `{ "payload", "voice" }` shape or a raw Gemini
/// `generateContent` body; the latter carries no voice, so `voice` is used.
pub fn parse_response(text: &str, voice: VoicePreset) -> Result<SynthesisResponse, BackendError> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    if value.get("candidates").is_some() {
        let audio = gemini::inline_audio(value)?;
        if let Some(rate) = audio.sample_rate() {
            tracing::debug!("Inline audio reports {} Hz ({})", rate, audio.mime_type);
        }
        return Ok(SynthesisResponse {
            payload: audio.data,
            voice,
        });
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_names_parse_case_insensitively() {
        assert_eq!("puck".parse::<VoicePreset>().unwrap(), VoicePreset::Puck);
        assert_eq!(" Zephyr ".parse::<VoicePreset>().unwrap(), VoicePreset::Zephyr);
        assert!("Aoede".parse::<VoicePreset>().is_err());
    }

    #[test]
    fn lists_all_presets() {
        let voices = list_voices();
        assert_eq!(voices.len(), 5);
        assert_eq!(voices[0].id, "Kore");
        assert_eq!(voices[1].description, "Upbeat");
    }

    #[test]
    fn parses_plain_response() {
        let response = parse_response(r#"{"payload":"AQI=","voice":"Fenrir"}"#, VoicePreset::Puck)
            .unwrap();
        assert_eq!(response.voice, VoicePreset::Fenrir);
        assert_eq!(response.payload.as_str(), "AQI=");
    }

    #[test]
    fn rejects_other_shapes() {
        for text in [
            r#"{"payload":"AQI=","voice":"Fenrir","x":1}"#,
            r#"{"payload":"AQI=","voice":"Nobody"}"#,
            r#"{"audio":"AQI="}"#,
            "AQI=",
        ] {
            assert!(parse_response(text, VoicePreset::Puck).is_err(), "{}", text);
        }
    }

    #[test]
    fn parses_gemini_body_with_fallback_voice() {
        let body = r#"{"candidates":[{"content":{"parts":[{"inlineData":
            {"mimeType":"audio/L16;codec=pcm;rate=24000","data":"AAA="}}]}}]}"#;
        let response = parse_response(body, VoicePreset::Charon).unwrap();
        assert_eq!(response.voice, VoicePreset::Charon);
        assert_eq!(response.payload.as_str(), "AAA=");
    }
}
