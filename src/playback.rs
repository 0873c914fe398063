//! Play/pause/progress state machine for the installed artifact.

use crate::artifact::ArtifactHandle;
use crate::error::PlaybackError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    Ended,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Ended => write!(f, "ended"),
        }
    }
}

/// What the UI displays: status plus progress in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub progress: f64,
}

impl PlaybackState {
    pub const IDLE: PlaybackState = PlaybackState {
        status: PlaybackStatus::Idle,
        progress: 0.0,
    };

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Reports coming back from the playback device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Current position and total duration, both in seconds
    Position { position: f64, duration: f64 },
    EndOfStream,
}

/// Output device driven by the state machine. Commands are fire-and-forget;
/// their effects come back as [`PlayerEvent`]s.
pub trait PlaybackDevice {
    /// Points the device at a new source, replacing any previous one
    fn load(&mut self, handle: &ArtifactHandle) -> Result<(), PlaybackError>;

    fn play(&mut self) -> Result<(), PlaybackError>;

    fn pause(&mut self) -> Result<(), PlaybackError>;

    /// Stops playback and rewinds to the start
    fn stop(&mut self) -> Result<(), PlaybackError>;
}

pub struct PlaybackMachine<D: PlaybackDevice> {
    device: D,
    source: Option<ArtifactHandle>,
    state: PlaybackState,
}

impl<D: PlaybackDevice> PlaybackMachine<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            source: None,
            state: PlaybackState::IDLE,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn source(&self) -> Option<&ArtifactHandle> {
        self.source.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Switches to a newly installed artifact. Always lands in `Idle/0`.
    pub fn load(&mut self, handle: ArtifactHandle) -> Result<PlaybackState, PlaybackError> {
        self.halt();
        self.source = None;

        self.device.load(&handle)?;
        debug!("Playback source set to {}", handle);
        self.source = Some(handle);
        Ok(self.state)
    }

    /// Drops the current source, e.g. when the artifact is released.
    pub fn unload(&mut self) -> PlaybackState {
        self.halt();
        self.source = None;
        self.state
    }

    /// The single user-facing control.
    pub fn toggle(&mut self) -> Result<Option<PlaybackState>, PlaybackError> {
        if self.source.is_none() {
            debug!("Toggle ignored: nothing loaded");
            return Ok(None);
        }

        let next = match self.state.status {
            PlaybackStatus::Idle | PlaybackStatus::Paused => {
                self.device.play()?;
                PlaybackState {
                    status: PlaybackStatus::Playing,
                    progress: self.state.progress,
                }
            }
            PlaybackStatus::Playing => {
                self.device.pause()?;
                PlaybackState {
                    status: PlaybackStatus::Paused,
                    progress: self.state.progress,
                }
            }
            PlaybackStatus::Ended => {
                // Replay from the top.
                self.device.stop()?;
                self.device.play()?;
                PlaybackState {
                    status: PlaybackStatus::Playing,
                    progress: 0.0,
                }
            }
        };

        Ok(Some(self.transition(next)))
    }

    /// Applies a device report. Returns the new state when it changed
    /// anything, `None` when the event was ignored.
    pub fn handle_event(&mut self, event: PlayerEvent) -> Option<PlaybackState> {
        if self.state.status != PlaybackStatus::Playing {
            return None;
        }

        match event {
            PlayerEvent::Position { position, duration } => {
                if !(duration.is_finite() && duration > 0.0) || !position.is_finite() {
                    return None;
                }
                if position >= duration {
                    return None;
                }
                let progress = (position / duration).clamp(0.0, 1.0);
                self.state.progress = progress;
                Some(self.state)
            }
            PlayerEvent::EndOfStream => Some(self.transition(PlaybackState {
                status: PlaybackStatus::Ended,
                progress: 1.0,
            })),
        }
    }

    /// Forces `Idle/0`, stopping the device first if it is playing.
    fn halt(&mut self) {
        if self.state.is_playing() {
            if let Err(e) = self.device.stop() {
                warn!("Failed to stop device during reset: {}", e);
            }
        }
        self.transition(PlaybackState::IDLE);
    }

    fn transition(&mut self, next: PlaybackState) -> PlaybackState {
        if next.status != self.state.status {
            debug!("Playback {} -> {}", self.state.status, next.status);
        }
        self.state = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDevice {
        commands: Vec<&'static str>,
        fail_play: bool,
    }

    impl PlaybackDevice for RecordingDevice {
        fn load(&mut self, _handle: &ArtifactHandle) -> Result<(), PlaybackError> {
            self.commands.push("load");
            Ok(())
        }

        fn play(&mut self) -> Result<(), PlaybackError> {
            if self.fail_play {
                return Err(PlaybackError::Device("no output".into()));
            }
            self.commands.push("play");
            Ok(())
        }

        fn pause(&mut self) -> Result<(), PlaybackError> {
            self.commands.push("pause");
            Ok(())
        }

        fn stop(&mut self) -> Result<(), PlaybackError> {
            self.commands.push("stop");
            Ok(())
        }
    }

    fn loaded() -> PlaybackMachine<RecordingDevice> {
        let mut machine = PlaybackMachine::new(RecordingDevice::default());
        machine.load(ArtifactHandle::new("blob:test/1")).unwrap();
        machine
    }

    fn status(machine: &PlaybackMachine<RecordingDevice>) -> PlaybackStatus {
        machine.state().status
    }

    #[test]
    fn full_cycle() {
        let mut machine = loaded();
        let mut seen = vec![status(&machine)];

        for _ in 0..3 {
            machine.toggle().unwrap();
            seen.push(status(&machine));
        }
        machine.handle_event(PlayerEvent::EndOfStream);
        seen.push(status(&machine));

        use PlaybackStatus::*;
        assert_eq!(seen, vec![Idle, Playing, Paused, Playing, Ended]);
        assert_eq!(machine.state().progress, 1.0);
        assert_eq!(
            machine.device().commands,
            vec!["load", "play", "pause", "play"]
        );
    }

    #[test]
    fn position_updates_only_while_playing() {
        let mut machine = loaded();
        let report = PlayerEvent::Position {
            position: 1.0,
            duration: 4.0,
        };

        assert_eq!(machine.handle_event(report), None);

        machine.toggle().unwrap();
        let state = machine.handle_event(report).unwrap();
        assert_eq!(state.progress, 0.25);

        machine.toggle().unwrap();
        assert_eq!(
            machine.handle_event(PlayerEvent::Position {
                position: 3.0,
                duration: 4.0
            }),
            None
        );
        assert_eq!(machine.state().progress, 0.25);
    }

    #[test]
    fn zero_duration_emits_nothing() {
        let mut machine = loaded();
        machine.toggle().unwrap();
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_eq!(
                machine.handle_event(PlayerEvent::Position {
                    position: 0.5,
                    duration
                }),
                None
            );
        }
        assert_eq!(machine.state().progress, 0.0);
    }

    #[test]
    fn position_at_or_past_duration_is_ignored() {
        let mut machine = loaded();
        machine.toggle().unwrap();
        assert_eq!(
            machine.handle_event(PlayerEvent::Position {
                position: 4.0,
                duration: 4.0
            }),
            None
        );
    }

    #[test]
    fn end_of_stream_only_from_playing() {
        for toggles in [0, 2] {
            let mut machine = loaded();
            for _ in 0..toggles {
                machine.toggle().unwrap();
            }
            let before = machine.state();
            assert_eq!(machine.handle_event(PlayerEvent::EndOfStream), None);
            assert_eq!(machine.state(), before);
        }
    }

    #[test]
    fn ended_ignores_device_reports() {
        let mut machine = loaded();
        machine.toggle().unwrap();
        machine.handle_event(PlayerEvent::EndOfStream);
        let ended = machine.state();
        assert_eq!(ended.status, PlaybackStatus::Ended);

        assert_eq!(
            machine.handle_event(PlayerEvent::Position {
                position: 0.5,
                duration: 4.0
            }),
            None
        );
        assert_eq!(machine.handle_event(PlayerEvent::EndOfStream), None);
        assert_eq!(machine.state(), ended);
        assert_eq!(machine.device().commands, vec!["load", "play"]);
    }

    #[test]
    fn toggle_after_end_restarts() {
        let mut machine = loaded();
        machine.toggle().unwrap();
        machine.handle_event(PlayerEvent::EndOfStream);

        let state = machine.toggle().unwrap().unwrap();
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.progress, 0.0);
        assert_eq!(
            machine.device().commands,
            vec!["load", "play", "stop", "play"]
        );
    }

    #[test]
    fn loading_while_playing_stops_device() {
        let mut machine = loaded();
        machine.toggle().unwrap();
        machine.handle_event(PlayerEvent::Position {
            position: 2.0,
            duration: 4.0,
        });

        let state = machine.load(ArtifactHandle::new("blob:test/2")).unwrap();
        assert_eq!(state, PlaybackState::IDLE);
        assert_eq!(machine.source().unwrap().as_str(), "blob:test/2");
        assert_eq!(
            machine.device().commands,
            vec!["load", "play", "stop", "load"]
        );
    }

    #[test]
    fn loading_while_paused_does_not_stop() {
        let mut machine = loaded();
        machine.toggle().unwrap();
        machine.toggle().unwrap();
        machine.load(ArtifactHandle::new("blob:test/2")).unwrap();
        assert_eq!(
            machine.device().commands,
            vec!["load", "play", "pause", "load"]
        );
    }

    #[test]
    fn toggle_without_source_is_ignored() {
        let mut machine = PlaybackMachine::new(RecordingDevice::default());
        assert_eq!(machine.toggle().unwrap(), None);
        assert!(machine.device().commands.is_empty());

        let mut machine = loaded();
        machine.toggle().unwrap();
        machine.unload();
        assert_eq!(machine.toggle().unwrap(), None);
        assert_eq!(machine.state(), PlaybackState::IDLE);
    }

    #[test]
    fn failed_play_leaves_state_alone() {
        let mut machine = loaded();
        machine.device_mut().fail_play = true;
        assert!(machine.toggle().is_err());
        assert_eq!(machine.state(), PlaybackState::IDLE);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackState::IDLE).unwrap();
        assert_eq!(json, r#"{"status":"idle","progress":0.0}"#);
    }
}
