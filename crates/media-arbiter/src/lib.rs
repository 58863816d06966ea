//! Media Arbiter: process-wide media session arbitration
//!
//! Every playing, paused or capturing unit in a process registers with a
//! single [`SessionArbiter`], which decides:
//!
//! - **Admission**: may a session start audible playback right now?
//! - **Interruption**: which sessions pause when the OS or application state changes
//! - **Routing**: which session receives remote-control commands and owns now-playing
//! - **Audio session**: when the shared OS audio session is activated, categorized, released
//!
//! Hosts implement [`MediaSession`], [`AudioCaptureSource`] and [`AudioSession`];
//! the arbiter keeps non-owning references and hands back handles.
//!
//! The [`scenario`] module replays scripted host events against simulated
//! sessions, and backs the `arbiter-sim` binary.

pub mod arbiter;
pub mod capabilities;
pub mod error;
pub mod handles;
pub mod now_playing;
pub mod scenario;
pub mod tasks;
pub mod types;

pub use arbiter::SessionArbiter;
pub use capabilities::{AudioCaptureSource, AudioSession, MediaSession};
pub use error::ArbiterError;
pub use handles::{CaptureSourceHandle, SessionHandle};
pub use now_playing::{NowPlayingInfo, NowPlayingMetadata, NowPlayingMetadataObserver, ObserverId};
pub use scenario::{
    Scenario, ScenarioError, SimulatedAudioSession, SimulatedCaptureSource, SimulatedSession,
    StepReport,
};
pub use tasks::{DeferredTask, TaskQueue};
pub use types::{
    AudioSessionCategory, DelayCallingUpdateNowPlaying, EndInterruptionFlags, InterruptionType,
    MediaSessionGroupId, MediaType, PlaybackControlsPurpose, RemoteCommandArgument,
    RemoteControlCommand, RestrictionTable, SessionRestrictions, SessionState,
};

pub use arbiterconf::DecoderConfig;
