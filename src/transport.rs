//! Base64 transport decoding for TTS payloads.

use crate::error::DecodeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Base64 text as handed over by the TTS collaborator. Consumed by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for EncodedPayload {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for EncodedPayload {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Raw little-endian PCM bytes straight out of the decoder.
///
/// The frame-size invariant is checked by the encoder, not here: the decoder
/// only guarantees that it produced exactly what the payload described.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmBuffer {
    bytes: Vec<u8>,
}

impl PcmBuffer {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Packs signed 16-bit samples as little-endian bytes.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when the buffer holds a whole number of `frame_size` frames.
    pub fn is_frame_aligned(&self, frame_size: usize) -> bool {
        frame_size != 0 && self.bytes.len() % frame_size == 0
    }
}

/// Number of bytes a well-formed padded payload of `text` decodes to.
fn expected_decoded_len(text: &[u8]) -> usize {
    let padding = text.iter().rev().take(2).take_while(|&&b| b == b'=').count();
    text.len() / 4 * 3 - padding
}

/// Decodes a standard, padded base64 payload into PCM bytes.
pub fn decode(payload: EncodedPayload) -> Result<PcmBuffer, DecodeError> {
    let text = payload.0.as_bytes();

    if text.len() % 4 != 0 {
        return Err(DecodeError::TruncatedBlock { length: text.len() });
    }

    let bytes = STANDARD.decode(text).map_err(map_base64_error)?;

    let expected = expected_decoded_len(text);
    if bytes.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(PcmBuffer::from_bytes(bytes))
}

fn map_base64_error(err: base64::DecodeError) -> DecodeError {
    match err {
        // The engine reports '=' in the middle of the input as an invalid byte.
        base64::DecodeError::InvalidByte(_, b'=') => DecodeError::InvalidPadding,
        base64::DecodeError::InvalidByte(offset, byte) => {
            DecodeError::InvalidCharacter { offset, byte }
        }
        base64::DecodeError::InvalidLength(length) => DecodeError::TruncatedBlock { length },
        base64::DecodeError::InvalidLastSymbol(_, _) => DecodeError::InvalidPadding,
        base64::DecodeError::InvalidPadding => DecodeError::InvalidPadding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_padded_blocks() {
        assert_eq!(decode("AQI=".into()).unwrap().as_bytes(), &[1, 2]);
        assert_eq!(decode("AQID".into()).unwrap().as_bytes(), &[1, 2, 3]);
        assert_eq!(decode("AQ==".into()).unwrap().as_bytes(), &[1]);
    }

    #[test]
    fn empty_payload_is_empty_buffer() {
        let pcm = decode("".into()).unwrap();
        assert!(pcm.is_empty());
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        let err = decode("AQ-D".into()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidCharacter {
                offset: 2,
                byte: b'-'
            }
        );
    }

    #[test]
    fn rejects_whitespace() {
        assert!(matches!(
            decode("AQID AQID".into()),
            Err(DecodeError::TruncatedBlock { length: 9 })
        ));
        assert!(matches!(
            decode("AQ\nD".into()),
            Err(DecodeError::InvalidCharacter { byte: b'\n', .. })
        ));
    }

    #[test]
    fn rejects_truncated_final_block() {
        assert_eq!(
            decode("AQIDB".into()).unwrap_err(),
            DecodeError::TruncatedBlock { length: 5 }
        );
        // Unpadded input is not accepted either.
        assert_eq!(
            decode("AQI".into()).unwrap_err(),
            DecodeError::TruncatedBlock { length: 3 }
        );
    }

    #[test]
    fn rejects_misplaced_padding() {
        assert_eq!(decode("A=AA".into()).unwrap_err(), DecodeError::InvalidPadding);
        assert_eq!(decode("AQ==AQID".into()).unwrap_err(), DecodeError::InvalidPadding);
    }

    #[test]
    fn rejects_non_canonical_trailing_bits() {
        // "AR==" carries bits past the single decoded byte.
        assert_eq!(decode("AR==".into()).unwrap_err(), DecodeError::InvalidPadding);
    }

    #[test]
    fn expected_length_accounts_for_padding() {
        assert_eq!(expected_decoded_len(b"AAAA"), 3);
        assert_eq!(expected_decoded_len(b"AAA="), 2);
        assert_eq!(expected_decoded_len(b"AA=="), 1);
        assert_eq!(expected_decoded_len(b""), 0);
    }

    #[test]
    fn samples_are_packed_little_endian() {
        let pcm = PcmBuffer::from_samples(&[1, -2]);
        assert_eq!(pcm.as_bytes(), &[0x01, 0x00, 0xFE, 0xFF]);
        assert!(pcm.is_frame_aligned(2));
        assert!(!PcmBuffer::from_bytes(vec![0; 3]).is_frame_aligned(2));
    }
}
