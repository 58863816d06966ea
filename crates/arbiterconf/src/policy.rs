//! Policy configuration - seeds the arbiter at startup, then the arbiter
//! owns the state and hosts mutate it through explicit calls.

use serde::{Deserialize, Serialize};

/// Playback policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Deactivate the shared audio session once the last session leaves
    /// and nothing else requires it.
    #[serde(default = "PolicyConfig::default_deactivate_when_idle")]
    pub deactivate_audio_session_when_idle: bool,
}

impl PolicyConfig {
    fn default_deactivate_when_idle() -> bool {
        true
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            deactivate_audio_session_when_idle: Self::default_deactivate_when_idle(),
        }
    }
}

/// Initial restriction names per media type.
///
/// Names are snake_case restriction flags (`concurrent_playback_not_permitted`,
/// `background_process_playback_restricted`, ...). They are validated by the
/// arbiter when the policy is applied, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestrictionsConfig {
    #[serde(default)]
    pub video: Vec<String>,

    #[serde(default)]
    pub audio: Vec<String>,

    #[serde(default)]
    pub video_audio: Vec<String>,

    #[serde(default)]
    pub web_audio: Vec<String>,
}

impl RestrictionsConfig {
    /// Iterate `(media type name, restriction names)` pairs.
    pub fn entries(&self) -> [(&'static str, &[String]); 4] {
        [
            ("video", &self.video),
            ("audio", &self.audio),
            ("video_audio", &self.video_audio),
            ("web_audio", &self.web_audio),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, names)| names.is_empty())
    }
}

/// Decoder availability toggles. Reported to hosts, never consulted by
/// arbitration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub webm_format_reader: bool,
    #[serde(default)]
    pub vorbis: bool,
    #[serde(default)]
    pub opus: bool,
    #[serde(default)]
    pub vp8: bool,
    #[serde(default)]
    pub vp9: bool,
    #[serde(default)]
    pub sw_vp_decoders_always_enabled: bool,
    #[serde(default)]
    pub alternate_webm_player: bool,
}

impl DecoderConfig {
    /// Field names paired with their current values, in file order.
    pub fn entries(&self) -> [(&'static str, bool); 7] {
        [
            ("webm_format_reader", self.webm_format_reader),
            ("vorbis", self.vorbis),
            ("opus", self.opus),
            ("vp8", self.vp8),
            ("vp9", self.vp9),
            ("sw_vp_decoders_always_enabled", self.sw_vp_decoders_always_enabled),
            ("alternate_webm_player", self.alternate_webm_player),
        ]
    }

    /// Set a toggle by name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: bool) -> bool {
        let slot = match name {
            "webm_format_reader" => &mut self.webm_format_reader,
            "vorbis" => &mut self.vorbis,
            "opus" => &mut self.opus,
            "vp8" => &mut self.vp8,
            "vp9" => &mut self.vp9,
            "sw_vp_decoders_always_enabled" => &mut self.sw_vp_decoders_always_enabled,
            "alternate_webm_player" => &mut self.alternate_webm_player,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Everything that seeds arbiter state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub restrictions: RestrictionsConfig,

    #[serde(default)]
    pub decoders: DecoderConfig,
}
