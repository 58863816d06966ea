//! Capability traits the host supplies to the arbiter.
//!
//! The arbiter never owns a session or capture source. Hosts keep the `Arc`
//! and register it; the arbiter holds a `Weak` and skips anything the host
//! has already dropped.

use std::sync::Arc;

use crate::now_playing::NowPlayingInfo;
use crate::types::{
    AudioSessionCategory, EndInterruptionFlags, InterruptionType, MediaSessionGroupId, MediaType,
    PlaybackControlsPurpose, RemoteCommandArgument, RemoteControlCommand, SessionState,
};

/// A playback or capture unit coordinated by the arbiter.
///
/// Mutating calls (`pause_session`, `begin_interruption`, ...) may re-enter
/// the arbiter. The arbiter never holds its own lock while invoking them.
pub trait MediaSession: Send + Sync {
    fn media_type(&self) -> MediaType;

    /// Type used when ranking for remote controls. Usually `media_type()`.
    fn presentation_type(&self) -> MediaType {
        self.media_type()
    }

    fn state(&self) -> SessionState;

    fn can_produce_audio(&self) -> bool;

    fn active_audio_session_required(&self) -> bool;

    /// Whether this session may keep playing while `other` plays.
    fn can_play_concurrently(&self, other: &dyn MediaSession) -> bool;

    fn can_receive_remote_control_commands(&self) -> bool;

    fn did_receive_remote_control_command(
        &self,
        command: RemoteControlCommand,
        argument: &RemoteCommandArgument,
    );

    fn supports_seeking(&self) -> bool;

    fn is_active_now_playing_session(&self) -> bool;

    fn begin_interruption(&self, interruption: InterruptionType);

    fn end_interruption(&self, flags: EndInterruptionFlags);

    fn pause_session(&self);

    fn stop_session(&self);

    fn suspend_buffering(&self);

    fn resume_buffering(&self);

    /// Pick the session to control from `candidates` (all of one group,
    /// audio/video or WebAudio). The default takes the first.
    fn select_best_media_session(
        &self,
        candidates: &[Arc<dyn MediaSession>],
        _purpose: PlaybackControlsPurpose,
    ) -> Option<Arc<dyn MediaSession>> {
        candidates.first().cloned()
    }

    /// Group of the owning document, if any.
    fn group_id(&self) -> Option<MediaSessionGroupId>;

    /// Owner notification when the process suspends or resumes.
    fn process_is_suspended_changed(&self, _suspended: bool) {}

    fn now_playing_info(&self) -> Option<NowPlayingInfo> {
        None
    }

    /// Stable identifier for log lines.
    fn log_identifier(&self) -> String;

    fn description(&self) -> String {
        format!(
            "{} {} state={:?} audible={}",
            self.log_identifier(),
            self.media_type(),
            self.state(),
            self.can_produce_audio()
        )
    }
}

/// A microphone/camera producer that may need the audio session.
pub trait AudioCaptureSource: Send + Sync {
    fn is_capturing_audio(&self) -> bool;

    fn wants_to_capture_audio(&self) -> bool;
}

/// The single OS-level audio output activation shared by the process.
pub trait AudioSession: Send + Sync {
    /// Returns whether the session ended up in the requested state.
    fn try_to_set_active(&self, active: bool) -> bool;

    fn set_category(&self, _category: AudioSessionCategory) {}
}
