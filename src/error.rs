//! Error types for vox-render
//!
//! Each stage of the audio pipeline has its own error enum so callers can tell
//! a malformed upstream payload apart from an internal defect.

use thiserror::Error;

/// Malformed transport payload. Fatal to the request, shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte outside the base64 alphabet
    #[error("invalid character {byte:#04x} at offset {offset}")]
    InvalidCharacter { offset: usize, byte: u8 },

    /// Padding in the wrong place or of the wrong length
    #[error("invalid padding")]
    InvalidPadding,

    /// Input length is not a whole number of 4-character blocks
    #[error("truncated final block: payload length {length} is not a multiple of 4")]
    TruncatedBlock { length: usize },

    /// Decoded size disagrees with the size implied by the input length
    #[error("decoded length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// The PCM buffer handed to the container encoder broke its contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("PCM length {length} is not a multiple of the {block_align}-byte frame size")]
    MisalignedFrames { length: usize, block_align: u16 },

    #[error("PCM payload of {length} bytes does not fit in a RIFF container")]
    TooLarge { length: usize },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Internal invariant breach in the artifact lifecycle. Indicates a defect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceLifecycleViolation {
    /// Release of an artifact this manager never issued
    #[error("release of {handle}, which is not installed in this manager")]
    NotInstalled { handle: String },

    /// The store no longer knows a reference the manager believes is live
    #[error("reference {handle} was revoked behind the manager's back")]
    StaleReference { handle: String },
}

/// Output device failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("no artifact loaded")]
    NothingLoaded,
}

/// Malformed or empty responses from the TTS collaborator
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to parse synthesis response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response carried no audio data")]
    MissingAudio,

    #[error("unknown voice: {0}")]
    UnknownVoice(String),

    #[error("failed to read captured response: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can abort a render request
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("audio payload could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("audio could not be encoded: {0}")]
    Encoding(#[from] EncodingError),

    #[error("artifact lifecycle violation: {0}")]
    Lifecycle(#[from] ReferenceLifecycleViolation),

    #[error("playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("speech backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Message suitable for the error indicator. Lifecycle violations are
    /// defects and are never shown verbatim.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Lifecycle(_) => "Internal error while preparing audio.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience Result type using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
