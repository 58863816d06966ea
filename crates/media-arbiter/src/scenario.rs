//! Scenario replayer - scripted host events against simulated sessions.
//!
//! A scenario file declares sessions and capture sources, then a list of
//! steps. Simulated sessions behave like a media element would: pausing
//! reports `session_will_end_playback`, every state change reports
//! `session_state_changed`, and interruptions save and restore state.
//!
//! ```toml
//! name = "two players"
//!
//! [[sessions]]
//! name = "video"
//! media_type = "video"
//!
//! [[steps]]
//! action = "add_session"
//! session = "video"
//!
//! [[steps]]
//! action = "play"
//! session = "video"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arbiterconf::SeedConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::capabilities::{AudioCaptureSource, AudioSession, MediaSession};
use crate::handles::{CaptureSourceHandle, SessionHandle};
use crate::now_playing::{NowPlayingInfo, NowPlayingMetadata};
use crate::types::{
    AudioSessionCategory, DelayCallingUpdateNowPlaying, EndInterruptionFlags, InterruptionType,
    MediaSessionGroupId, MediaType, RemoteCommandArgument, RemoteControlCommand,
    SessionRestrictions, SessionState,
};
use crate::{ArbiterError, SessionArbiter};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown capture source: {0}")]
    UnknownCaptureSource(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error(transparent)]
    Arbiter(#[from] ArbiterError),
}

fn default_true() -> bool {
    true
}

/// A simulated session declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSpec {
    pub name: String,
    pub media_type: MediaType,

    /// Sessions naming the same group share a `MediaSessionGroupId`.
    #[serde(default)]
    pub group: Option<String>,

    #[serde(default = "default_true")]
    pub can_produce_audio: bool,

    /// Defaults to `can_produce_audio`.
    #[serde(default)]
    pub requires_audio_session: Option<bool>,

    #[serde(default)]
    pub can_play_concurrently: bool,

    #[serde(default = "default_true")]
    pub remote_commands: bool,

    #[serde(default = "default_true")]
    pub supports_seeking: bool,

    /// Now-playing title; defaults to the session name.
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSourceSpec {
    pub name: String,
    #[serde(default)]
    pub capturing: bool,
}

/// One scripted host event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    AddSession {
        session: String,
    },
    RemoveSession {
        session: String,
    },
    Play {
        session: String,
    },
    Pause {
        session: String,
    },
    Stop {
        session: String,
    },
    SetCurrent {
        session: String,
    },
    BeginInterruption {
        interruption: InterruptionType,
    },
    EndInterruption {
        #[serde(default)]
        flags: EndInterruptionFlags,
    },
    BecomeInactive,
    BecomeActive,
    EnterBackground {
        #[serde(default)]
        suspended_under_lock: bool,
    },
    EnterForeground {
        #[serde(default)]
        suspended_under_lock: bool,
    },
    Suspend,
    Resume,
    Sleep,
    Wake,
    RemoteCommand {
        command: RemoteControlCommand,
        #[serde(default)]
        time: Option<f64>,
        #[serde(default)]
        fast_seek: Option<bool>,
    },
    AddRestriction {
        media_type: MediaType,
        restriction: String,
    },
    RemoveRestriction {
        media_type: MediaType,
        restriction: String,
    },
    ResetRestrictions,
    AddCaptureSource {
        source: String,
    },
    RemoveCaptureSource {
        source: String,
    },
    SetCapturing {
        source: String,
        capturing: bool,
    },
    SetAudioActivation {
        allow: bool,
    },
    PauseGroup {
        group: String,
    },
    SuspendGroup {
        group: String,
    },
    ResumeGroup {
        group: String,
    },
    StopAll,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::AddSession { session } => write!(f, "add {}", session),
            Step::RemoveSession { session } => write!(f, "remove {}", session),
            Step::Play { session } => write!(f, "play {}", session),
            Step::Pause { session } => write!(f, "pause {}", session),
            Step::Stop { session } => write!(f, "stop {}", session),
            Step::SetCurrent { session } => write!(f, "set current {}", session),
            Step::BeginInterruption { interruption } => {
                write!(f, "begin interruption {:?}", interruption)
            }
            Step::EndInterruption { flags } => write!(f, "end interruption {:?}", flags),
            Step::BecomeInactive => f.write_str("application will become inactive"),
            Step::BecomeActive => f.write_str("application did become active"),
            Step::EnterBackground { suspended_under_lock } => write!(
                f,
                "enter background (suspended under lock: {})",
                suspended_under_lock
            ),
            Step::EnterForeground { suspended_under_lock } => write!(
                f,
                "enter foreground (suspended under lock: {})",
                suspended_under_lock
            ),
            Step::Suspend => f.write_str("process will suspend"),
            Step::Resume => f.write_str("process did resume"),
            Step::Sleep => f.write_str("system will sleep"),
            Step::Wake => f.write_str("system did wake"),
            Step::RemoteCommand { command, .. } => write!(f, "remote {:?}", command),
            Step::AddRestriction {
                media_type,
                restriction,
            } => write!(f, "restrict {} +{}", media_type, restriction),
            Step::RemoveRestriction {
                media_type,
                restriction,
            } => write!(f, "restrict {} -{}", media_type, restriction),
            Step::ResetRestrictions => f.write_str("reset restrictions"),
            Step::AddCaptureSource { source } => write!(f, "add capture {}", source),
            Step::RemoveCaptureSource { source } => write!(f, "remove capture {}", source),
            Step::SetCapturing { source, capturing } => {
                write!(f, "capture {} = {}", source, capturing)
            }
            Step::SetAudioActivation { allow } => write!(f, "audio activation allowed = {}", allow),
            Step::PauseGroup { group } => write!(f, "pause group {}", group),
            Step::SuspendGroup { group } => write!(f, "suspend group {}", group),
            Step::ResumeGroup { group } => write!(f, "resume group {}", group),
            Step::StopAll => f.write_str("stop all"),
        }
    }
}

/// A complete scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub sessions: Vec<SessionSpec>,

    #[serde(default)]
    pub capture_sources: Vec<CaptureSourceSpec>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Arbiter-visible state after one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: String,
    /// Result of the step, for steps that return one (play, remove).
    pub accepted: Option<bool>,
    /// Registered session names in priority order.
    pub order: Vec<String>,
    pub states: BTreeMap<String, SessionState>,
    pub interruption: Option<InterruptionType>,
    pub category: AudioSessionCategory,
    pub audio_session_active: bool,
    pub now_playing: Option<String>,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>3}] {}", self.index, self.step)?;
        if let Some(accepted) = self.accepted {
            write!(f, " -> {}", if accepted { "ok" } else { "denied" })?;
        }
        writeln!(f)?;

        let order: Vec<String> = self
            .order
            .iter()
            .map(|name| match self.states.get(name) {
                Some(state) => format!("{}({:?})", name, state),
                None => name.clone(),
            })
            .collect();
        writeln!(f, "      order: [{}]", order.join(", "))?;
        write!(
            f,
            "      category: {:?}, audio active: {}",
            self.category, self.audio_session_active
        )?;
        if let Some(interruption) = self.interruption {
            write!(f, ", interruption: {:?}", interruption)?;
        }
        if let Some(title) = &self.now_playing {
            write!(f, ", now playing: {}", title)?;
        }
        Ok(())
    }
}

impl Scenario {
    pub fn from_toml(contents: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = toml::from_str(contents)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ScenarioError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Check every step references a declared session, source or group.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut sessions = HashMap::new();
        for spec in &self.sessions {
            if sessions.insert(spec.name.as_str(), spec).is_some() {
                return Err(ScenarioError::DuplicateName(spec.name.clone()));
            }
        }
        let mut sources = HashMap::new();
        for spec in &self.capture_sources {
            if sessions.contains_key(spec.name.as_str())
                || sources.insert(spec.name.as_str(), spec).is_some()
            {
                return Err(ScenarioError::DuplicateName(spec.name.clone()));
            }
        }

        let has_group = |group: &str| {
            self.sessions
                .iter()
                .any(|spec| spec.group.as_deref() == Some(group))
        };

        for step in &self.steps {
            match step {
                Step::AddSession { session }
                | Step::RemoveSession { session }
                | Step::Play { session }
                | Step::Pause { session }
                | Step::Stop { session }
                | Step::SetCurrent { session } => {
                    if !sessions.contains_key(session.as_str()) {
                        return Err(ScenarioError::UnknownSession(session.clone()));
                    }
                }
                Step::AddCaptureSource { source }
                | Step::RemoveCaptureSource { source }
                | Step::SetCapturing { source, .. } => {
                    if !sources.contains_key(source.as_str()) {
                        return Err(ScenarioError::UnknownCaptureSource(source.clone()));
                    }
                }
                Step::PauseGroup { group }
                | Step::SuspendGroup { group }
                | Step::ResumeGroup { group } => {
                    if !has_group(group) {
                        return Err(ScenarioError::UnknownGroup(group.clone()));
                    }
                }
                Step::AddRestriction { restriction, .. }
                | Step::RemoveRestriction { restriction, .. } => {
                    restriction.parse::<SessionRestrictions>()?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Replay every step against a fresh arbiter seeded from `seed`.
    pub fn run(&self, seed: &SeedConfig) -> Result<Vec<StepReport>, ScenarioError> {
        self.validate()?;
        let mut replay = Replay::new(self, seed)?;
        info!(
            "replaying scenario '{}' ({} steps)",
            self.name,
            self.steps.len()
        );

        let mut reports = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let accepted = replay.apply(step)?;
            replay.arbiter.run_pending_tasks();
            reports.push(replay.report(index, step, accepted));
        }

        replay.arbiter.shutdown();
        Ok(reports)
    }
}

struct Replay {
    arbiter: Arc<SessionArbiter>,
    audio: Arc<SimulatedAudioSession>,
    sessions: BTreeMap<String, Arc<SimulatedSession>>,
    sources: HashMap<String, (Arc<SimulatedCaptureSource>, Option<CaptureSourceHandle>)>,
    groups: HashMap<String, MediaSessionGroupId>,
}

impl Replay {
    fn new(scenario: &Scenario, seed: &SeedConfig) -> Result<Self, ScenarioError> {
        let audio = SimulatedAudioSession::new();
        let arbiter = SessionArbiter::from_config(seed, audio.clone())?;

        let mut groups = HashMap::new();
        let mut sessions = BTreeMap::new();
        for spec in &scenario.sessions {
            let group = spec
                .group
                .as_ref()
                .map(|name| *groups.entry(name.clone()).or_insert_with(MediaSessionGroupId::new));
            let session = SimulatedSession::new(spec, group, &arbiter);
            sessions.insert(spec.name.clone(), session);
        }

        let sources = scenario
            .capture_sources
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    (SimulatedCaptureSource::new(spec.capturing), None),
                )
            })
            .collect();

        Ok(Self {
            arbiter,
            audio,
            sessions,
            sources,
            groups,
        })
    }

    fn session(&self, name: &str) -> Result<Arc<SimulatedSession>, ScenarioError> {
        self.sessions
            .get(name)
            .cloned()
            .ok_or_else(|| ScenarioError::UnknownSession(name.to_string()))
    }

    fn group(&self, name: &str) -> Result<MediaSessionGroupId, ScenarioError> {
        self.groups
            .get(name)
            .copied()
            .ok_or_else(|| ScenarioError::UnknownGroup(name.to_string()))
    }

    fn apply(&mut self, step: &Step) -> Result<Option<bool>, ScenarioError> {
        debug!("step: {}", step);
        let arbiter = Arc::clone(&self.arbiter);

        let accepted = match step {
            Step::AddSession { session } => {
                self.session(session)?.register();
                None
            }
            Step::RemoveSession { session } => Some(self.session(session)?.unregister()),
            Step::Play { session } => Some(self.session(session)?.play()),
            Step::Pause { session } => {
                self.session(session)?.pause();
                None
            }
            Step::Stop { session } => {
                self.session(session)?.stop();
                None
            }
            Step::SetCurrent { session } => {
                if let Some(handle) = self.session(session)?.handle() {
                    arbiter.set_current_session(handle);
                }
                None
            }
            Step::BeginInterruption { interruption } => {
                arbiter.begin_interruption(*interruption);
                None
            }
            Step::EndInterruption { flags } => {
                arbiter.end_interruption(*flags);
                None
            }
            Step::BecomeInactive => {
                arbiter.application_will_become_inactive();
                None
            }
            Step::BecomeActive => {
                arbiter.application_did_become_active();
                None
            }
            Step::EnterBackground {
                suspended_under_lock,
            } => {
                arbiter.application_did_enter_background(*suspended_under_lock);
                None
            }
            Step::EnterForeground {
                suspended_under_lock,
            } => {
                arbiter.application_will_enter_foreground(*suspended_under_lock);
                None
            }
            Step::Suspend => {
                arbiter.process_will_suspend();
                None
            }
            Step::Resume => {
                arbiter.process_did_resume();
                None
            }
            Step::Sleep => {
                arbiter.process_system_will_sleep();
                None
            }
            Step::Wake => {
                arbiter.process_system_did_wake();
                None
            }
            Step::RemoteCommand {
                command,
                time,
                fast_seek,
            } => {
                let argument = RemoteCommandArgument {
                    time: *time,
                    fast_seek: *fast_seek,
                };
                arbiter.process_did_receive_remote_control_command(*command, &argument);
                None
            }
            Step::AddRestriction {
                media_type,
                restriction,
            } => {
                arbiter.add_restriction(*media_type, restriction.parse()?);
                None
            }
            Step::RemoveRestriction {
                media_type,
                restriction,
            } => {
                arbiter.remove_restriction(*media_type, restriction.parse()?);
                None
            }
            Step::ResetRestrictions => {
                arbiter.reset_restrictions();
                None
            }
            Step::AddCaptureSource { source } => {
                let entry = self
                    .sources
                    .get_mut(source)
                    .ok_or_else(|| ScenarioError::UnknownCaptureSource(source.clone()))?;
                if entry.1.is_none() {
                    let dyn_source: Arc<dyn AudioCaptureSource> = entry.0.clone();
                    entry.1 = Some(arbiter.add_audio_capture_source(&dyn_source));
                }
                None
            }
            Step::RemoveCaptureSource { source } => {
                let entry = self
                    .sources
                    .get_mut(source)
                    .ok_or_else(|| ScenarioError::UnknownCaptureSource(source.clone()))?;
                let removed = entry
                    .1
                    .take()
                    .is_some_and(|handle| arbiter.remove_audio_capture_source(handle));
                Some(removed)
            }
            Step::SetCapturing { source, capturing } => {
                let entry = self
                    .sources
                    .get(source)
                    .ok_or_else(|| ScenarioError::UnknownCaptureSource(source.clone()))?;
                entry.0.set_capturing(*capturing);
                arbiter.session_can_produce_audio_changed();
                None
            }
            Step::SetAudioActivation { allow } => {
                self.audio.set_allow_activation(*allow);
                None
            }
            Step::PauseGroup { group } => {
                arbiter.pause_all_media_playback_for_group(self.group(group)?);
                None
            }
            Step::SuspendGroup { group } => {
                arbiter.suspend_all_media_playback_for_group(self.group(group)?);
                None
            }
            Step::ResumeGroup { group } => {
                arbiter.resume_all_media_playback_for_group(self.group(group)?);
                None
            }
            Step::StopAll => {
                arbiter.stop_all_media_playback_for_process();
                None
            }
        };
        Ok(accepted)
    }

    fn report(&self, index: usize, step: &Step, accepted: Option<bool>) -> StepReport {
        let names: HashMap<SessionHandle, &str> = self
            .sessions
            .iter()
            .filter_map(|(name, session)| session.handle().map(|h| (h, name.as_str())))
            .collect();

        let order = self
            .arbiter
            .session_handles()
            .into_iter()
            .map(|handle| {
                names
                    .get(&handle)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| handle.to_string())
            })
            .collect();

        let states = self
            .sessions
            .iter()
            .map(|(name, session)| (name.clone(), session.state()))
            .collect();

        StepReport {
            index,
            step: step.to_string(),
            accepted,
            order,
            states,
            interruption: self.arbiter.current_interruption(),
            category: self.arbiter.audio_session_category(),
            audio_session_active: self.audio.is_active(),
            now_playing: self
                .arbiter
                .now_playing_info()
                .map(|info| info.metadata.title),
        }
    }
}

#[derive(Default)]
struct SessionData {
    state: SessionState,
    handle: Option<SessionHandle>,
    interruption_count: u32,
    state_to_restore: SessionState,
    buffering_suspended: bool,
    events: Vec<String>,
}

/// In-memory session that reports to its arbiter like a media element.
pub struct SimulatedSession {
    name: String,
    media_type: MediaType,
    group: Option<MediaSessionGroupId>,
    can_produce_audio: bool,
    requires_audio_session: bool,
    can_play_concurrently: bool,
    remote_commands: bool,
    supports_seeking: bool,
    title: String,
    arbiter: Weak<SessionArbiter>,
    data: Mutex<SessionData>,
}

impl SimulatedSession {
    pub fn new(
        spec: &SessionSpec,
        group: Option<MediaSessionGroupId>,
        arbiter: &Arc<SessionArbiter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: spec.name.clone(),
            media_type: spec.media_type,
            group,
            can_produce_audio: spec.can_produce_audio,
            requires_audio_session: spec.requires_audio_session.unwrap_or(spec.can_produce_audio),
            can_play_concurrently: spec.can_play_concurrently,
            remote_commands: spec.remote_commands,
            supports_seeking: spec.supports_seeking,
            title: spec.title.clone().unwrap_or_else(|| spec.name.clone()),
            arbiter: Arc::downgrade(arbiter),
            data: Mutex::new(SessionData::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.data.lock().handle
    }

    /// Callbacks received from the arbiter, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.data.lock().events.clone()
    }

    pub fn is_buffering_suspended(&self) -> bool {
        self.data.lock().buffering_suspended
    }

    /// Register with the arbiter. Returns the existing handle if already registered.
    pub fn register(self: &Arc<Self>) -> Option<SessionHandle> {
        if let Some(handle) = self.handle() {
            return Some(handle);
        }
        let arbiter = self.arbiter.upgrade()?;
        let session: Arc<dyn MediaSession> = self.clone();
        let handle = arbiter.add_session(&session);
        self.data.lock().handle = Some(handle);
        Some(handle)
    }

    pub fn unregister(&self) -> bool {
        let Some(handle) = self.data.lock().handle.take() else {
            return false;
        };
        self.arbiter
            .upgrade()
            .is_some_and(|arbiter| arbiter.remove_session(handle))
    }

    /// Ask for admission and start playing if granted.
    pub fn play(&self) -> bool {
        let (Some(handle), Some(arbiter)) = (self.handle(), self.arbiter.upgrade()) else {
            return false;
        };
        if !arbiter.session_will_begin_playback(handle) {
            return false;
        }
        self.set_state(SessionState::Playing);
        true
    }

    pub fn pause(&self) {
        if self.state() != SessionState::Playing {
            return;
        }
        self.will_end_playback();
        self.set_state(SessionState::Paused);
    }

    pub fn stop(&self) {
        if self.state() == SessionState::Playing {
            self.will_end_playback();
        }
        self.set_state(SessionState::Idle);
    }

    fn will_end_playback(&self) {
        if let (Some(handle), Some(arbiter)) = (self.handle(), self.arbiter.upgrade()) {
            arbiter.session_will_end_playback(handle, DelayCallingUpdateNowPlaying::No);
        }
    }

    fn set_state(&self, state: SessionState) {
        let handle = {
            let mut data = self.data.lock();
            if data.state == state {
                return;
            }
            debug!("{}: {:?} -> {:?}", self.name, data.state, state);
            data.state = state;
            data.handle
        };

        if let (Some(handle), Some(arbiter)) = (handle, self.arbiter.upgrade()) {
            arbiter.session_state_changed(handle);
        }
    }

    fn record(&self, event: String) {
        self.data.lock().events.push(event);
    }
}

// A media element unregisters when it goes away
impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl MediaSession for SimulatedSession {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn state(&self) -> SessionState {
        self.data.lock().state
    }

    fn can_produce_audio(&self) -> bool {
        self.can_produce_audio
    }

    fn active_audio_session_required(&self) -> bool {
        self.requires_audio_session
    }

    /// Sessions of different media types never compete.
    fn can_play_concurrently(&self, other: &dyn MediaSession) -> bool {
        self.can_play_concurrently || other.media_type() != self.media_type
    }

    fn can_receive_remote_control_commands(&self) -> bool {
        self.remote_commands
    }

    fn did_receive_remote_control_command(
        &self,
        command: RemoteControlCommand,
        argument: &RemoteCommandArgument,
    ) {
        match argument.time {
            Some(time) => self.record(format!("remote {:?} @{}", command, time)),
            None => self.record(format!("remote {:?}", command)),
        }

        match command {
            RemoteControlCommand::Play => {
                self.play();
            }
            RemoteControlCommand::Pause => self.pause(),
            RemoteControlCommand::Stop => self.stop(),
            RemoteControlCommand::TogglePlayPause => {
                if self.state() == SessionState::Playing {
                    self.pause();
                } else {
                    self.play();
                }
            }
            _ => {}
        }
    }

    fn supports_seeking(&self) -> bool {
        self.supports_seeking
    }

    fn is_active_now_playing_session(&self) -> bool {
        self.remote_commands && self.state() == SessionState::Playing
    }

    fn begin_interruption(&self, interruption: InterruptionType) {
        self.record(format!("begin {:?}", interruption));
        {
            let mut data = self.data.lock();
            data.interruption_count += 1;
            if data.interruption_count > 1 {
                return;
            }
            data.state_to_restore = data.state;
        }
        self.set_state(SessionState::Interrupted);
    }

    fn end_interruption(&self, flags: EndInterruptionFlags) {
        self.record(format!("end {:?}", flags));
        let restore = {
            let mut data = self.data.lock();
            if data.interruption_count == 0 {
                return;
            }
            data.interruption_count -= 1;
            if data.interruption_count > 0 {
                return;
            }
            data.state_to_restore
        };

        match restore {
            SessionState::Playing if flags == EndInterruptionFlags::MayResumePlaying => {
                self.set_state(SessionState::Playing)
            }
            SessionState::Playing => self.set_state(SessionState::Paused),
            other => self.set_state(other),
        }
    }

    fn pause_session(&self) {
        self.record("pause".to_string());
        self.pause();
    }

    fn stop_session(&self) {
        self.record("stop".to_string());
        self.stop();
    }

    fn suspend_buffering(&self) {
        self.record("suspend buffering".to_string());
        self.data.lock().buffering_suspended = true;
    }

    fn resume_buffering(&self) {
        self.record("resume buffering".to_string());
        self.data.lock().buffering_suspended = false;
    }

    fn group_id(&self) -> Option<MediaSessionGroupId> {
        self.group
    }

    fn process_is_suspended_changed(&self, suspended: bool) {
        self.record(format!("process suspended {}", suspended));
    }

    fn now_playing_info(&self) -> Option<NowPlayingInfo> {
        let is_playing = self.state() == SessionState::Playing;
        Some(NowPlayingInfo {
            metadata: NowPlayingMetadata {
                title: self.title.clone(),
                source_application_identifier: "arbiter-sim".to_string(),
                ..Default::default()
            },
            rate: if is_playing { 1.0 } else { 0.0 },
            supports_seeking: self.supports_seeking,
            is_playing,
            ..Default::default()
        })
    }

    fn log_identifier(&self) -> String {
        self.name.clone()
    }
}

/// Audio session whose activation can be refused on demand.
pub struct SimulatedAudioSession {
    allow_activation: AtomicBool,
    active: AtomicBool,
    category: Mutex<AudioSessionCategory>,
}

impl SimulatedAudioSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            allow_activation: AtomicBool::new(true),
            active: AtomicBool::new(false),
            category: Mutex::new(AudioSessionCategory::None),
        })
    }

    pub fn set_allow_activation(&self, allow: bool) {
        self.allow_activation.store(allow, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn category(&self) -> AudioSessionCategory {
        *self.category.lock()
    }
}

impl AudioSession for SimulatedAudioSession {
    fn try_to_set_active(&self, active: bool) -> bool {
        if active && !self.allow_activation.load(Ordering::SeqCst) {
            return false;
        }
        self.active.store(active, Ordering::SeqCst);
        true
    }

    fn set_category(&self, category: AudioSessionCategory) {
        *self.category.lock() = category;
    }
}

pub struct SimulatedCaptureSource {
    capturing: AtomicBool,
}

impl SimulatedCaptureSource {
    pub fn new(capturing: bool) -> Arc<Self> {
        Arc::new(Self {
            capturing: AtomicBool::new(capturing),
        })
    }

    pub fn set_capturing(&self, capturing: bool) {
        self.capturing.store(capturing, Ordering::SeqCst);
    }
}

impl AudioCaptureSource for SimulatedCaptureSource {
    fn is_capturing_audio(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn wants_to_capture_audio(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}
