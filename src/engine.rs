//! Ties decoding, encoding, artifact ownership and playback together.

use crate::artifact::{ArtifactHandle, ArtifactManager, AudioArtifact, ReferenceStore};
use crate::backends::{SynthesisResponse, VoicePreset};
use crate::error::Result;
use crate::playback::{PlaybackDevice, PlaybackMachine, PlaybackState, PlayerEvent};
use crate::transport::{self, PcmBuffer};
use crate::wav::{self, WavFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Processing indicator shown next to the player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub generating: bool,
    pub error: Option<String>,
}

pub struct AudioEngine<S: ReferenceStore, D: PlaybackDevice> {
    format: WavFormat,
    artifacts: ArtifactManager<S>,
    player: PlaybackMachine<D>,
    status: EngineStatus,
    voice: Option<VoicePreset>,
}

impl<S: ReferenceStore, D: PlaybackDevice> AudioEngine<S, D> {
    pub fn new(format: WavFormat, store: S, device: D) -> Self {
        Self {
            format,
            artifacts: ArtifactManager::new(store),
            player: PlaybackMachine::new(device),
            status: EngineStatus::default(),
            voice: None,
        }
    }

    pub fn format(&self) -> &WavFormat {
        &self.format
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn artifact(&self) -> Option<&AudioArtifact> {
        self.artifacts.current()
    }

    /// Voice of the current artifact, when it came from a synthesis response
    pub fn voice(&self) -> Option<VoicePreset> {
        self.voice
    }

    pub fn player(&self) -> &PlaybackMachine<D> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlaybackMachine<D> {
        &mut self.player
    }

    pub fn resolve(&self, handle: &ArtifactHandle) -> Option<std::sync::Arc<[u8]>> {
        self.artifacts.resolve(handle)
    }

    /// Decodes and packages a synthesis response, then makes it the playable
    /// artifact. A payload that fails to decode or encode leaves the previous
    /// artifact in place. If the device cannot load the new artifact, it is
    /// released again and nothing stays installed.
    pub fn render(&mut self, response: SynthesisResponse) -> Result<ArtifactHandle> {
        info!(
            "Rendering {} payload characters (voice: {})",
            response.payload.len(),
            response.voice
        );
        let voice = response.voice;

        self.track(move |engine| {
            let pcm = transport::decode(response.payload)?;
            debug!("Decoded {} PCM bytes", pcm.len());
            let bytes = wav::encode(&pcm, &engine.format)?;
            let handle = engine.install(bytes)?;
            engine.voice = Some(voice);
            Ok(handle)
        })
    }

    /// Packages raw PCM without going through the transport decoder.
    pub fn render_pcm(&mut self, pcm: &PcmBuffer) -> Result<ArtifactHandle> {
        self.track(|engine| {
            let bytes = wav::encode(pcm, &engine.format)?;
            engine.install(bytes)
        })
    }

    /// Installs an already encoded WAV file as the artifact.
    pub fn install_wav(&mut self, bytes: Vec<u8>) -> Result<ArtifactHandle> {
        self.track(|engine| engine.install(bytes))
    }

    pub fn toggle(&mut self) -> Result<Option<PlaybackState>> {
        Ok(self.player.toggle()?)
    }

    pub fn handle_event(&mut self, event: PlayerEvent) -> Option<PlaybackState> {
        self.player.handle_event(event)
    }

    /// Writes the current artifact under the download name.
    pub fn save_download(&self, dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
        match self.artifacts.current() {
            Some(artifact) => Ok(Some(artifact.save(dir, file_name)?)),
            None => Ok(None),
        }
    }

    /// Releases the current artifact and resets the player.
    pub fn release(&mut self) -> Result<()> {
        self.player.unload();
        self.voice = None;
        self.artifacts.clear()?;
        Ok(())
    }

    /// Teardown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.release() {
            warn!("Shutdown: {}", e);
        }
        info!("Audio engine shut down");
    }

    fn install(&mut self, bytes: Vec<u8>) -> Result<ArtifactHandle> {
        // Drop the player's view of the old artifact before it is revoked.
        self.player.unload();
        self.voice = None;
        let handle = self.artifacts.install(bytes)?.handle().clone();

        if let Err(e) = self.player.load(handle.clone()) {
            // An artifact the player cannot open must not stay installed.
            if let Err(violation) = self.artifacts.clear() {
                warn!("Rollback of {}: {}", handle, violation);
            }
            return Err(e.into());
        }
        Ok(handle)
    }

    fn track<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.status = EngineStatus {
            generating: true,
            error: None,
        };
        let result = step(self);
        self.status.generating = false;

        if let Err(e) = &result {
            warn!("Render failed: {}", e);
            self.status.error = Some(e.user_message());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::BlobStore;
    use crate::error::{PipelineError, PlaybackError};
    use crate::playback::PlaybackStatus;
    use crate::transport::EncodedPayload;

    #[derive(Default)]
    struct NullDevice;

    impl PlaybackDevice for NullDevice {
        fn load(&mut self, _handle: &ArtifactHandle) -> std::result::Result<(), PlaybackError> {
            Ok(())
        }
        fn play(&mut self) -> std::result::Result<(), PlaybackError> {
            Ok(())
        }
        fn pause(&mut self) -> std::result::Result<(), PlaybackError> {
            Ok(())
        }
        fn stop(&mut self) -> std::result::Result<(), PlaybackError> {
            Ok(())
        }
    }

    fn engine() -> AudioEngine<BlobStore, NullDevice> {
        AudioEngine::new(WavFormat::default(), BlobStore::new(), NullDevice)
    }

    fn response(payload: &str) -> SynthesisResponse {
        SynthesisResponse {
            payload: EncodedPayload::new(payload),
            voice: VoicePreset::Kore,
        }
    }

    #[test]
    fn render_installs_playable_wav() {
        let mut engine = engine();
        let handle = engine.render(response("AQIDBA==")).unwrap();

        let bytes = engine.resolve(&handle).unwrap();
        assert_eq!(bytes.len(), 44 + 4);
        assert_eq!(&bytes[44..], &[1, 2, 3, 4]);
        assert_eq!(engine.voice(), Some(VoicePreset::Kore));
        assert_eq!(engine.state(), PlaybackState::IDLE);
        assert_eq!(engine.status(), &EngineStatus::default());
    }

    #[test]
    fn failed_render_keeps_previous_artifact() {
        let mut engine = engine();
        let first = engine.render(response("AQIDBA==")).unwrap();
        engine.toggle().unwrap();

        let err = engine.render(response("not base64!")).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert_eq!(engine.artifact().unwrap().handle(), &first);
        assert!(engine.resolve(&first).is_some());
        assert_eq!(engine.state().status, PlaybackStatus::Playing);
        assert!(engine.status().error.is_some());
        assert!(!engine.status().generating);
    }

    #[test]
    fn odd_pcm_is_an_encoding_error() {
        let mut engine = engine();
        // "AQID" decodes to three bytes.
        let err = engine.render(response("AQID")).unwrap_err();
        assert!(matches!(err, PipelineError::Encoding(_)));
        assert!(engine.artifact().is_none());
    }

    #[test]
    fn successful_render_clears_error() {
        let mut engine = engine();
        let _ = engine.render(response("@@@@"));
        assert!(engine.status().error.is_some());
        engine.render(response("AAAA")).unwrap_err();
        engine.render(response("")).unwrap();
        assert_eq!(engine.status().error, None);
    }

    #[test]
    fn release_resets_everything() {
        let mut engine = engine();
        let handle = engine.render_pcm(&PcmBuffer::from_samples(&[1, 2])).unwrap();
        engine.toggle().unwrap();

        engine.release().unwrap();
        assert!(engine.resolve(&handle).is_none());
        assert!(engine.player().source().is_none());
        assert_eq!(engine.state(), PlaybackState::IDLE);
        engine.shutdown();
    }

    #[test]
    fn saves_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine();
        assert_eq!(engine.save_download(dir.path(), "a.wav").unwrap(), None);

        engine.render(response("AAAA")).unwrap_err();
        engine.render(response("AAA=")).unwrap();
        let path = engine.save_download(dir.path(), "a.wav").unwrap().unwrap();
        assert_eq!(std::fs::read(path).unwrap().len(), 46);
    }
}
