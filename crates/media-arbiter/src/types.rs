//! Vocabulary shared by the arbiter and the sessions it coordinates.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ArbiterError;

/// Classification of a session. Drives the restriction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Audio,
    VideoAudio,
    WebAudio,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::Video,
        MediaType::Audio,
        MediaType::VideoAudio,
        MediaType::WebAudio,
    ];

    /// Dense index into per-type tables.
    pub fn index(self) -> usize {
        match self {
            MediaType::Video => 0,
            MediaType::Audio => 1,
            MediaType::VideoAudio => 2,
            MediaType::WebAudio => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::VideoAudio => "video_audio",
            MediaType::WebAudio => "web_audio",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ArbiterError::UnknownMediaType(s.to_string()))
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Autoplaying,
    Playing,
    Paused,
    Interrupted,
}

/// Why sessions are being interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionType {
    SystemSleep,
    EnteringBackground,
    SystemInterruption,
    SuspendedUnderLock,
    InvisibleAutoplay,
    ProcessInactive,
    PlaybackSuspended,
    PageNotVisible,
}

/// What a session may do once an interruption ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndInterruptionFlags {
    #[default]
    NoFlags,
    MayResumePlaying,
}

/// Commands delivered by the platform's remote-control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteControlCommand {
    Play,
    Pause,
    Stop,
    TogglePlayPause,
    BeginSeekingBackward,
    EndSeekingBackward,
    BeginSeekingForward,
    EndSeekingForward,
    SeekToPlaybackPosition,
    SkipForward,
    SkipBackward,
    NextTrack,
    PreviousTrack,
    BeginScrubbing,
    EndScrubbing,
}

/// Optional payload accompanying a remote-control command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommandArgument {
    /// Target time or skip interval, in seconds.
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub fast_seek: Option<bool>,
}

/// Who is asking for the best session to control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackControlsPurpose {
    ControlsManager,
    NowPlaying,
    MediaSession,
}

/// Whether `session_will_end_playback` should leave now-playing refresh to
/// the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DelayCallingUpdateNowPlaying {
    #[default]
    No,
    Yes,
}

/// Category the shared audio session is configured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSessionCategory {
    #[default]
    None,
    AmbientSound,
    SoloAmbientSound,
    MediaPlayback,
    RecordAudio,
    PlayAndRecord,
    AudioProcessing,
}

/// Opaque identifier grouping the sessions of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSessionGroupId(pub Uuid);

impl MediaSessionGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaSessionGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaSessionGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bitmask of playback restrictions for one media type.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionRestrictions(u32);

impl SessionRestrictions {
    pub const NONE: Self = Self(0);
    pub const CONCURRENT_PLAYBACK_NOT_PERMITTED: Self = Self(1 << 0);
    pub const BACKGROUND_PROCESS_PLAYBACK_RESTRICTED: Self = Self(1 << 2);
    pub const BACKGROUND_TAB_PLAYBACK_RESTRICTED: Self = Self(1 << 3);
    pub const INTERRUPTED_PLAYBACK_NOT_PERMITTED: Self = Self(1 << 4);
    pub const INACTIVE_PROCESS_PLAYBACK_RESTRICTED: Self = Self(1 << 5);
    pub const SUSPENDED_UNDER_LOCK_PLAYBACK_RESTRICTED: Self = Self(1 << 6);

    const NAMED: [(&'static str, SessionRestrictions); 6] = [
        (
            "concurrent_playback_not_permitted",
            Self::CONCURRENT_PLAYBACK_NOT_PERMITTED,
        ),
        (
            "background_process_playback_restricted",
            Self::BACKGROUND_PROCESS_PLAYBACK_RESTRICTED,
        ),
        (
            "background_tab_playback_restricted",
            Self::BACKGROUND_TAB_PLAYBACK_RESTRICTED,
        ),
        (
            "interrupted_playback_not_permitted",
            Self::INTERRUPTED_PLAYBACK_NOT_PERMITTED,
        ),
        (
            "inactive_process_playback_restricted",
            Self::INACTIVE_PROCESS_PLAYBACK_RESTRICTED,
        ),
        (
            "suspended_under_lock_playback_restricted",
            Self::SUSPENDED_UNDER_LOCK_PLAYBACK_RESTRICTED,
        ),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any flag in `other` is set.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Names of the set flags.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Combine a list of flag names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ArbiterError> {
        let mut restrictions = Self::NONE;
        for name in names {
            restrictions |= name.as_ref().parse::<Self>()?;
        }
        Ok(restrictions)
    }
}

impl FromStr for SessionRestrictions {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMED
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, flag)| *flag)
            .ok_or_else(|| ArbiterError::UnknownRestriction(s.to_string()))
    }
}

impl fmt::Debug for SessionRestrictions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("SessionRestrictions(none)");
        }
        write!(f, "SessionRestrictions({})", self.names().join(" | "))
    }
}

impl BitOr for SessionRestrictions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SessionRestrictions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SessionRestrictions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for SessionRestrictions {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for SessionRestrictions {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Restriction bitmask per media type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestrictionTable([SessionRestrictions; 4]);

impl RestrictionTable {
    pub fn get(&self, media_type: MediaType) -> SessionRestrictions {
        self.0[media_type.index()]
    }

    /// True when `media_type` carries any flag in `restriction`.
    pub fn has(&self, media_type: MediaType, restriction: SessionRestrictions) -> bool {
        self.get(media_type).intersects(restriction)
    }

    pub fn add(&mut self, media_type: MediaType, restriction: SessionRestrictions) {
        self.0[media_type.index()] |= restriction;
    }

    pub fn remove(&mut self, media_type: MediaType, restriction: SessionRestrictions) {
        self.0[media_type.index()] &= !restriction;
    }

    pub fn reset(&mut self) {
        self.0 = [SessionRestrictions::NONE; 4];
    }
}
