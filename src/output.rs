//! Local speaker output via rodio.
//!
//! rodio does not report playback position, so position is derived from the
//! time spent in the playing state and the duration in the WAV header.

use crate::artifact::{ArtifactHandle, BlobResolver};
use crate::error::PlaybackError;
use crate::playback::{PlaybackDevice, PlayerEvent};
use crate::wav;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Wall-clock position tracker that only advances while playing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayClock {
    started: Option<Instant>,
    accumulated: Duration,
}

impl PlayClock {
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(started) = self.started.take() {
            self.accumulated += now.saturating_duration_since(started);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .started
                .map(|s| now.saturating_duration_since(s))
                .unwrap_or_default()
    }
}

struct LoadedSource {
    handle: ArtifactHandle,
    bytes: Arc<[u8]>,
    duration: f64,
}

pub struct RodioDevice {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    resolver: BlobResolver,
    volume: f32,
    source: Option<LoadedSource>,
    sink: Option<Sink>,
    clock: PlayClock,
}

impl RodioDevice {
    /// Opens the default output device. Handles are dereferenced through
    /// `resolver` at load time.
    pub fn open(resolver: BlobResolver, volume: f32) -> Result<Self, PlaybackError> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| PlaybackError::Device(format!("No audio output device found: {}", e)))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            resolver,
            volume,
            source: None,
            sink: None,
            clock: PlayClock::default(),
        })
    }

    /// Next report for the state machine, if playback is under way.
    pub fn poll(&mut self) -> Option<PlayerEvent> {
        if !self.clock.is_running() {
            return None;
        }
        let source = self.source.as_ref()?;
        let sink = self.sink.as_ref()?;

        if sink.empty() {
            debug!("Playback of {} reached end of stream", source.handle);
            self.clock.reset();
            self.sink = None;
            return Some(PlayerEvent::EndOfStream);
        }

        Some(PlayerEvent::Position {
            position: self.clock.elapsed_at(Instant::now()).as_secs_f64(),
            duration: source.duration,
        })
    }

    fn prime(&mut self) -> Result<(), PlaybackError> {
        let source = self.source.as_ref().ok_or(PlaybackError::NothingLoaded)?;

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| PlaybackError::Device(format!("Failed to create sink: {}", e)))?;
        let decoder = Decoder::new(Cursor::new(source.bytes.to_vec()))
            .map_err(|e| PlaybackError::Device(format!("Failed to decode: {}", e)))?;

        sink.pause();
        sink.set_volume(self.volume);
        sink.append(decoder);
        self.sink = Some(sink);
        Ok(())
    }
}

impl PlaybackDevice for RodioDevice {
    fn load(&mut self, handle: &ArtifactHandle) -> Result<(), PlaybackError> {
        self.sink = None;
        self.clock.reset();

        let bytes = self
            .resolver
            .resolve(handle)
            .ok_or_else(|| PlaybackError::Device(format!("{} does not resolve", handle)))?;
        let duration = wav::parse_header(&bytes)
            .map(|(format, data_len)| format.duration_secs(data_len))
            .unwrap_or_else(|| {
                warn!("{} has no canonical WAV header; progress unavailable", handle);
                0.0
            });

        self.source = Some(LoadedSource {
            handle: handle.clone(),
            bytes,
            duration,
        });
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.sink.is_none() {
            self.prime()?;
        }
        if let Some(sink) = &self.sink {
            sink.play();
            self.clock.start(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.clock.pause(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.clock.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_advances_while_running() {
        let t0 = Instant::now();
        let mut clock = PlayClock::default();
        assert_eq!(clock.elapsed_at(t0), Duration::ZERO);

        clock.start(t0);
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(2)), Duration::from_secs(2));

        clock.pause(t0 + Duration::from_secs(2));
        assert!(!clock.is_running());
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(9)), Duration::from_secs(2));

        clock.start(t0 + Duration::from_secs(10));
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(11)), Duration::from_secs(3));
    }

    #[test]
    fn restarting_a_running_clock_keeps_origin() {
        let t0 = Instant::now();
        let mut clock = PlayClock::default();
        clock.start(t0);
        clock.start(t0 + Duration::from_secs(5));
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(6)), Duration::from_secs(6));

        clock.reset();
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(6)), Duration::ZERO);
    }
}
