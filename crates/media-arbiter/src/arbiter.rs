//! SessionArbiter - process-wide coordination of media sessions
//!
//! Tracks every session and audio capture source in the process and decides:
//! - Playback admission (restrictions, shared audio-session activation)
//! - Interruption fan-out for OS/application lifecycle transitions
//! - Which session receives remote-control commands and now-playing status
//!
//! Registry order carries meaning: index 0 is the current session, and a
//! pausing session drops behind the sessions still playing.
//!
//! All callbacks into sessions run without the arbiter's lock held, over a
//! snapshot of the registry taken before the first callback. Sessions may
//! re-enter the arbiter (pause, stop, unregister) from any callback.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::{Arc, Weak};

use arbiterconf::{DecoderConfig, PolicyConfig, RestrictionsConfig, SeedConfig};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capabilities::{AudioCaptureSource, AudioSession, MediaSession};
use crate::handles::{CaptureSourceHandle, HandleTable, SessionHandle};
use crate::now_playing::{
    NowPlayingInfo, NowPlayingMetadata, NowPlayingMetadataObserver, ObserverId, ObserverSet,
};
use crate::tasks::{DeferredTask, TaskQueue};
use crate::types::{
    AudioSessionCategory, DelayCallingUpdateNowPlaying, EndInterruptionFlags, InterruptionType,
    MediaSessionGroupId, MediaType, PlaybackControlsPurpose, RemoteCommandArgument,
    RemoteControlCommand, RestrictionTable, SessionRestrictions, SessionState,
};
use crate::ArbiterError;

struct ArbiterState {
    sessions: HandleTable<dyn MediaSession>,
    order: Vec<SessionHandle>,
    capture_sources: HandleTable<dyn AudioCaptureSource>,
    restrictions: RestrictionTable,
    current_interruption: Option<InterruptionType>,
    observers: ObserverSet,
    last_published_metadata: Option<NowPlayingMetadata>,
    category: AudioSessionCategory,
    pending: [bool; DeferredTask::COUNT],

    became_active: bool,
    should_deactivate_audio_session: bool,
    is_application_inactive: bool,
    is_application_in_background: bool,
    process_is_suspended: bool,
    is_system_asleep: bool,

    is_playing_to_automotive_head_unit: bool,
    supports_spatial_audio_playback: Option<bool>,
    decoders: DecoderConfig,
}

impl ArbiterState {
    fn new() -> Self {
        Self {
            sessions: HandleTable::default(),
            order: Vec::new(),
            capture_sources: HandleTable::default(),
            restrictions: RestrictionTable::default(),
            current_interruption: None,
            observers: ObserverSet::default(),
            last_published_metadata: None,
            category: AudioSessionCategory::None,
            pending: [false; DeferredTask::COUNT],
            became_active: false,
            should_deactivate_audio_session: PolicyConfig::default()
                .deactivate_audio_session_when_idle,
            is_application_inactive: false,
            is_application_in_background: false,
            process_is_suspended: false,
            is_system_asleep: false,
            is_playing_to_automotive_head_unit: false,
            supports_spatial_audio_playback: None,
            decoders: DecoderConfig::default(),
        }
    }
}

/// Process-wide media session manager.
///
/// Construct one per process and hand the `Arc` to every collaborator; it
/// lives until the host drops it, which cancels all deferred work.
pub struct SessionArbiter {
    state: Mutex<ArbiterState>,
    audio_session: Arc<dyn AudioSession>,
    tasks: Arc<TaskQueue>,
}

fn same_session(a: &dyn MediaSession, b: &dyn MediaSession) -> bool {
    std::ptr::addr_eq(a as *const dyn MediaSession, b as *const dyn MediaSession)
}

impl SessionArbiter {
    /// Create an arbiter with no restrictions and default policy.
    pub fn new(audio_session: Arc<dyn AudioSession>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ArbiterState::new()),
            audio_session,
            tasks: Arc::new(TaskQueue::new()),
        })
    }

    /// Create an arbiter seeded from configuration.
    pub fn from_config(
        seed: &SeedConfig,
        audio_session: Arc<dyn AudioSession>,
    ) -> Result<Arc<Self>, ArbiterError> {
        let arbiter = Self::new(audio_session);
        arbiter.apply_restriction_policy(&seed.restrictions)?;
        arbiter.set_should_deactivate_audio_session(seed.policy.deactivate_audio_session_when_idle);
        arbiter.set_decoder_support(seed.decoders);
        Ok(arbiter)
    }

    // === Registry ===

    /// Register a session at the lowest priority.
    ///
    /// A session joining during an interruption is interrupted immediately.
    /// Registering the same session twice returns its existing handle.
    pub fn add_session(&self, session: &Arc<dyn MediaSession>) -> SessionHandle {
        let (handle, added, interruption) = {
            let mut state = self.state.lock();
            match state.sessions.find(session) {
                Some(existing) => (SessionHandle(existing), false, None),
                None => {
                    let handle = SessionHandle(state.sessions.insert(session));
                    state.order.push(handle);
                    (handle, true, state.current_interruption)
                }
            }
        };

        if !added {
            debug!("{} already registered as {}", session.log_identifier(), handle);
            return handle;
        }

        info!("added session {} as {}", session.log_identifier(), handle);

        if let Some(interruption) = interruption {
            session.begin_interruption(interruption);
        }

        self.schedule_update_session_state();
        handle
    }

    /// Unregister a session. Unknown or stale handles are ignored.
    pub fn remove_session(&self, handle: SessionHandle) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let Some(removed) = state.sessions.remove(handle.0) else {
                debug!("remove_session: {} not registered", handle);
                return false;
            };
            state.order.retain(|h| *h != handle);
            removed
        };

        match removed.upgrade() {
            Some(session) => info!("removed session {} ({})", session.log_identifier(), handle),
            None => info!("removed session {}", handle),
        }

        if self.has_no_session() && !self.active_audio_session_required() {
            self.maybe_deactivate_audio_session();
        }

        self.schedule_update_session_state();
        true
    }

    /// Resolve a handle to its session, if still registered and alive.
    pub fn session(&self, handle: SessionHandle) -> Option<Arc<dyn MediaSession>> {
        self.state.lock().sessions.get(handle.0)
    }

    /// Registered handles in priority order.
    pub fn session_handles(&self) -> Vec<SessionHandle> {
        self.state.lock().order.clone()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// True while the handle is registered, even if the owner dropped the session.
    pub fn is_registered(&self, handle: SessionHandle) -> bool {
        self.state.lock().sessions.contains(handle.0)
    }

    /// True when nothing is registered or every registered session is gone.
    pub fn has_no_session(&self) -> bool {
        self.session_snapshot()
            .iter()
            .all(|weak| weak.strong_count() == 0)
    }

    /// Promote a session to index 0.
    pub fn set_current_session(&self, handle: SessionHandle) {
        let mut state = self.state.lock();
        if state.order.len() < 2 {
            return;
        }

        let Some(index) = state.order.iter().position(|h| *h == handle) else {
            debug!("set_current_session: {} not registered", handle);
            return;
        };
        if index == 0 {
            return;
        }

        state.order.remove(index);
        state.order.insert(0, handle);
        debug!("{} moved from index {} to 0", handle, index);
    }

    pub fn current_session(&self) -> Option<Arc<dyn MediaSession>> {
        let state = self.state.lock();
        let first = state.order.first()?;
        state.sessions.get(first.0)
    }

    pub fn current_session_handle(&self) -> Option<SessionHandle> {
        self.state.lock().order.first().copied()
    }

    /// Move a pausing session behind the run of sessions still playing from
    /// the front of the registry.
    ///
    /// The scan stops at the first session that is neither the pausing one
    /// nor playing. Nothing moves unless both the pausing session and a
    /// playing session after it are found before that point.
    pub fn session_will_end_playback(
        &self,
        handle: SessionHandle,
        delay: DelayCallingUpdateNowPlaying,
    ) {
        self.reorder_pausing_session(handle);

        if delay == DelayCallingUpdateNowPlaying::No {
            self.schedule_session_status_update();
        }
    }

    fn reorder_pausing_session(&self, handle: SessionHandle) {
        let snapshot: Vec<(SessionHandle, Option<Arc<dyn MediaSession>>)> = {
            let state = self.state.lock();
            state
                .order
                .iter()
                .map(|h| (*h, state.sessions.get(h.0)))
                .collect()
        };

        if snapshot.len() < 2 {
            return;
        }

        let mut pausing_index = None;
        let mut last_playing_index = None;
        for (index, (candidate, session)) in snapshot.iter().enumerate() {
            if *candidate == handle {
                pausing_index = Some(index);
                continue;
            }
            match session {
                // Owner already gone; skip rather than end the run
                None => continue,
                Some(session) if session.state() == SessionState::Playing => {
                    last_playing_index = Some(index)
                }
                Some(_) => break,
            }
        }

        let (Some(pausing_index), Some(last_playing_index)) = (pausing_index, last_playing_index)
        else {
            return;
        };
        if pausing_index > last_playing_index {
            return;
        }

        let mut state = self.state.lock();
        if !state.order.iter().eq(snapshot.iter().map(|(h, _)| h)) {
            debug!("registry changed while ranking {}, leaving order alone", handle);
            return;
        }
        let moved = state.order.remove(pausing_index);
        state.order.insert(last_playing_index, moved);
        debug!(
            "{} moved from index {} to {}",
            handle, pausing_index, last_playing_index
        );
    }

    /// React to a session's state change.
    ///
    /// A transition to Playing updates the audio session synchronously so it
    /// is active and categorized before audio starts; anything else is
    /// deferred.
    pub fn session_state_changed(&self, handle: SessionHandle) {
        let Some(session) = self.session(handle) else {
            debug!("session_state_changed: {} not registered", handle);
            return;
        };

        if session.state() == SessionState::Playing {
            self.update_session_state();
        } else {
            self.schedule_update_session_state();
        }

        self.schedule_session_status_update();
        self.schedule_state_log();
    }

    // === Playback admission ===

    /// Decide whether `handle` may start audible playback.
    ///
    /// On admission, any process-wide interruption ends and, when the media
    /// type forbids concurrent playback, every other playing session that
    /// cannot coexist with this one is paused.
    pub fn session_will_begin_playback(&self, handle: SessionHandle) -> bool {
        self.set_current_session(handle);

        let Some(session) = self.session(handle) else {
            warn!("session_will_begin_playback: {} not registered", handle);
            return false;
        };

        let restrictions = self.restrictions(session.media_type());
        if session.state() == SessionState::Interrupted
            && restrictions.contains(SessionRestrictions::INTERRUPTED_PLAYBACK_NOT_PERMITTED)
        {
            info!(
                "{} denied: interrupted and interrupted playback not permitted",
                session.log_identifier()
            );
            return false;
        }

        if !self.maybe_activate_audio_session() {
            info!(
                "{} denied: failed to activate audio session",
                session.log_identifier()
            );
            return false;
        }

        if self.current_interruption().is_some() {
            self.end_interruption(EndInterruptionFlags::MayResumePlaying);
        }

        if restrictions.contains(SessionRestrictions::CONCURRENT_PLAYBACK_NOT_PERMITTED) {
            let starting = session.as_ref();
            self.for_each_matching_session(
                |other| {
                    !same_session(other, starting)
                        && other.state() == SessionState::Playing
                        && !other.can_play_concurrently(starting)
                },
                |other| other.pause_session(),
            );
        }

        debug!("{} admitted", session.log_identifier());
        true
    }

    // === Restrictions ===

    pub fn add_restriction(&self, media_type: MediaType, restriction: SessionRestrictions) {
        self.state.lock().restrictions.add(media_type, restriction);
    }

    pub fn remove_restriction(&self, media_type: MediaType, restriction: SessionRestrictions) {
        self.state.lock().restrictions.remove(media_type, restriction);
    }

    pub fn restrictions(&self, media_type: MediaType) -> SessionRestrictions {
        self.state.lock().restrictions.get(media_type)
    }

    pub fn reset_restrictions(&self) {
        self.state.lock().restrictions.reset();
    }

    /// Add the configured restrictions. Nothing is applied if any name is invalid.
    pub fn apply_restriction_policy(&self, policy: &RestrictionsConfig) -> Result<(), ArbiterError> {
        let mut parsed = Vec::with_capacity(4);
        for (name, flags) in policy.entries() {
            let media_type: MediaType = name.parse()?;
            parsed.push((media_type, SessionRestrictions::from_names(flags)?));
        }

        let mut state = self.state.lock();
        for (media_type, flags) in parsed {
            if !flags.is_empty() {
                debug!("seeding {} restrictions: {:?}", media_type, flags);
                state.restrictions.add(media_type, flags);
            }
        }
        Ok(())
    }

    fn restriction_table(&self) -> RestrictionTable {
        self.state.lock().restrictions
    }

    // === Queries ===

    pub fn has(&self, media_type: MediaType) -> bool {
        self.any_of_sessions(|session| session.media_type() == media_type)
    }

    pub fn count(&self, media_type: MediaType) -> usize {
        self.session_snapshot()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|session| session.media_type() == media_type)
            .count()
    }

    pub fn can_produce_audio(&self) -> bool {
        self.any_of_sessions(|session| session.can_produce_audio())
    }

    /// Whether some session or capturing source needs the shared audio session.
    pub fn active_audio_session_required(&self) -> bool {
        if self.any_of_sessions(|session| session.active_audio_session_required()) {
            return true;
        }
        self.capture_source_snapshot()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|source| source.is_capturing_audio())
    }

    pub fn has_active_audio_session(&self) -> bool {
        self.state.lock().became_active
    }

    pub fn current_interruption(&self) -> Option<InterruptionType> {
        self.state.lock().current_interruption
    }

    pub fn audio_session_category(&self) -> AudioSessionCategory {
        self.state.lock().category
    }

    pub fn is_application_in_background(&self) -> bool {
        self.state.lock().is_application_in_background
    }

    pub fn process_is_suspended(&self) -> bool {
        self.state.lock().process_is_suspended
    }

    // === Interruptions ===

    /// Interrupt every registered session.
    pub fn begin_interruption(&self, interruption: InterruptionType) {
        info!("begin interruption {:?}", interruption);
        self.state.lock().current_interruption = Some(interruption);

        self.for_each_session(|session| session.begin_interruption(interruption));

        self.schedule_update_session_state();
    }

    /// End the current interruption for every registered session.
    pub fn end_interruption(&self, flags: EndInterruptionFlags) {
        info!("end interruption {:?}", flags);
        self.state.lock().current_interruption = None;

        self.for_each_session(|session| session.end_interruption(flags));
    }

    // === Application and process lifecycle ===

    pub fn application_will_become_inactive(&self) {
        {
            let mut state = self.state.lock();
            if state.is_application_inactive {
                return;
            }
            state.is_application_inactive = true;
        }
        info!("application will become inactive");

        let table = self.restriction_table();
        self.for_each_matching_session(
            |session| {
                table.has(
                    session.media_type(),
                    SessionRestrictions::INACTIVE_PROCESS_PLAYBACK_RESTRICTED,
                )
            },
            |session| session.begin_interruption(InterruptionType::ProcessInactive),
        );
    }

    pub fn application_did_become_active(&self) {
        {
            let mut state = self.state.lock();
            if !state.is_application_inactive {
                return;
            }
            state.is_application_inactive = false;
        }
        info!("application did become active");

        let table = self.restriction_table();
        self.for_each_matching_session(
            |session| {
                table.has(
                    session.media_type(),
                    SessionRestrictions::INACTIVE_PROCESS_PLAYBACK_RESTRICTED,
                )
            },
            |session| session.end_interruption(EndInterruptionFlags::MayResumePlaying),
        );
    }

    pub fn application_did_enter_background(&self, suspended_under_lock: bool) {
        {
            let mut state = self.state.lock();
            if state.is_application_in_background {
                return;
            }
            state.is_application_in_background = true;
        }
        info!(
            "application did enter background (suspended under lock: {})",
            suspended_under_lock
        );

        let table = self.restriction_table();
        self.for_each_session(|session| {
            let restrictions = table.get(session.media_type());
            if suspended_under_lock
                && restrictions.contains(SessionRestrictions::SUSPENDED_UNDER_LOCK_PLAYBACK_RESTRICTED)
            {
                session.begin_interruption(InterruptionType::SuspendedUnderLock);
            } else if restrictions.contains(SessionRestrictions::BACKGROUND_PROCESS_PLAYBACK_RESTRICTED) {
                session.begin_interruption(InterruptionType::EnteringBackground);
            }
        });
    }

    pub fn application_will_enter_foreground(&self, suspended_under_lock: bool) {
        {
            let mut state = self.state.lock();
            if !state.is_application_in_background {
                return;
            }
            state.is_application_in_background = false;
        }
        info!(
            "application will enter foreground (suspended under lock: {})",
            suspended_under_lock
        );

        let table = self.restriction_table();
        self.for_each_matching_session(
            |session| {
                let restrictions = table.get(session.media_type());
                (suspended_under_lock
                    && restrictions
                        .contains(SessionRestrictions::SUSPENDED_UNDER_LOCK_PLAYBACK_RESTRICTED))
                    || restrictions
                        .contains(SessionRestrictions::BACKGROUND_PROCESS_PLAYBACK_RESTRICTED)
            },
            |session| session.end_interruption(EndInterruptionFlags::MayResumePlaying),
        );
    }

    /// Tell every owner the process is suspending and release the audio session.
    pub fn process_will_suspend(&self) {
        {
            let mut state = self.state.lock();
            if state.process_is_suspended {
                return;
            }
            state.process_is_suspended = true;
        }
        info!("process will suspend");

        self.for_each_session(|session| session.process_is_suspended_changed(true));

        self.audio_session.try_to_set_active(false);
        self.state.lock().became_active = false;
    }

    pub fn process_did_resume(&self) {
        {
            let mut state = self.state.lock();
            if !state.process_is_suspended {
                return;
            }
            state.process_is_suspended = false;
        }
        info!("process did resume");

        self.for_each_session(|session| session.process_is_suspended_changed(false));

        if !self.has_active_audio_session() {
            self.maybe_activate_audio_session();
        }
    }

    pub fn process_system_will_sleep(&self) {
        {
            let mut state = self.state.lock();
            if state.current_interruption.is_some() || state.is_system_asleep {
                return;
            }
            state.is_system_asleep = true;
        }
        info!("system will sleep");

        self.for_each_session(|session| session.begin_interruption(InterruptionType::SystemSleep));
    }

    /// Ends the sleep interruption. While another interruption is active the
    /// sessions are left alone, but the sleep itself is still over.
    pub fn process_system_did_wake(&self) {
        {
            let mut state = self.state.lock();
            let was_asleep = std::mem::replace(&mut state.is_system_asleep, false);
            if state.current_interruption.is_some() || !was_asleep {
                return;
            }
        }
        info!("system did wake");

        self.for_each_session(|session| {
            session.end_interruption(EndInterruptionFlags::MayResumePlaying)
        });
    }

    /// While backgrounded, a background-restricted session that starts or
    /// stops playing to a wireless target is interrupted.
    pub fn session_is_playing_to_wireless_playback_target_changed(&self, handle: SessionHandle) {
        let Some(session) = self.session(handle) else {
            return;
        };

        let in_background = self.is_application_in_background();
        if !in_background
            || !self
                .restrictions(session.media_type())
                .contains(SessionRestrictions::BACKGROUND_PROCESS_PLAYBACK_RESTRICTED)
        {
            return;
        }

        if session.state() != SessionState::Interrupted {
            session.begin_interruption(InterruptionType::EnteringBackground);
        }
    }

    /// Coalesced: re-activate the audio session if now required, then update state.
    pub fn session_can_produce_audio_changed(&self) {
        debug!("session can produce audio changed");
        self.schedule(DeferredTask::ReevaluateAudioActivation);
    }

    // === Remote control and now playing ===

    /// Route a command to the current session if it accepts remote commands.
    /// Otherwise the command is dropped.
    pub fn process_did_receive_remote_control_command(
        &self,
        command: RemoteControlCommand,
        argument: &RemoteCommandArgument,
    ) {
        let Some(session) = self.current_session() else {
            debug!("dropping {:?}: no current session", command);
            return;
        };
        if !session.can_receive_remote_control_commands() {
            debug!(
                "dropping {:?}: {} does not accept remote commands",
                command,
                session.log_identifier()
            );
            return;
        }
        session.did_receive_remote_control_command(command, argument);
    }

    pub fn compute_supports_seeking(&self) -> bool {
        self.current_session()
            .map(|session| session.supports_seeking())
            .unwrap_or(false)
    }

    /// Pick the session remote controls should target.
    ///
    /// Audio/video sessions always win over WebAudio-only sessions; the
    /// first session of the winning group breaks the tie.
    pub fn best_eligible_session_for_remote_controls<F>(
        &self,
        filter: F,
        purpose: PlaybackControlsPurpose,
    ) -> Option<Arc<dyn MediaSession>>
    where
        F: Fn(&dyn MediaSession) -> bool,
    {
        let mut audio_video: Vec<Arc<dyn MediaSession>> = Vec::new();
        let mut web_audio: Vec<Arc<dyn MediaSession>> = Vec::new();

        for session in self
            .sessions_matching(filter)
            .iter()
            .filter_map(Weak::upgrade)
        {
            if session.presentation_type() == MediaType::WebAudio {
                if audio_video.is_empty() {
                    web_audio.push(session);
                }
            } else {
                audio_video.push(session);
            }
        }

        let group = if !audio_video.is_empty() {
            audio_video
        } else if !web_audio.is_empty() {
            web_audio
        } else {
            return None;
        };

        let first = Arc::clone(&group[0]);
        first.select_best_media_session(&group, purpose)
    }

    /// Now-playing info of the best audible session that accepts remote commands.
    pub fn now_playing_info(&self) -> Option<NowPlayingInfo> {
        self.best_eligible_session_for_remote_controls(
            |session| session.can_receive_remote_control_commands() && session.can_produce_audio(),
            PlaybackControlsPurpose::NowPlaying,
        )?
        .now_playing_info()
    }

    /// Register an observer. It is called right away with the current metadata.
    pub fn add_now_playing_metadata_observer(
        &self,
        observer: NowPlayingMetadataObserver,
    ) -> ObserverId {
        let metadata = self.now_playing_info().unwrap_or_default().metadata;
        let (id, changed) = {
            let mut state = self.state.lock();
            let changed = state.last_published_metadata.as_ref() != Some(&metadata);
            (state.observers.add(Arc::clone(&observer)), changed)
        };

        // A change nobody has seen yet goes to every observer, the new one included
        if changed {
            self.now_playing_metadata_changed(&metadata);
        } else {
            observer(&metadata);
        }
        id
    }

    pub fn remove_now_playing_metadata_observer(&self, id: ObserverId) -> bool {
        self.state.lock().observers.remove(id)
    }

    pub fn now_playing_observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Publish `metadata` to every observer.
    pub fn now_playing_metadata_changed(&self, metadata: &NowPlayingMetadata) {
        let observers = {
            let mut state = self.state.lock();
            state.last_published_metadata = Some(metadata.clone());
            state.observers.snapshot()
        };
        for observer in observers {
            observer(metadata);
        }
    }

    /// Recompute now-playing metadata and publish it if it changed.
    pub fn update_now_playing_info(&self) {
        let metadata = self.now_playing_info().unwrap_or_default().metadata;
        let changed = self.state.lock().last_published_metadata.as_ref() != Some(&metadata);
        if changed {
            debug!("now playing metadata changed: {:?}", metadata.title);
            self.now_playing_metadata_changed(&metadata);
        }
    }

    pub fn schedule_session_status_update(&self) {
        self.schedule(DeferredTask::UpdateNowPlayingInfo);
    }

    // === Group operations ===

    pub fn pause_all_media_playback_for_group(&self, group: MediaSessionGroupId) {
        self.for_each_session_in_group(group, |session| session.pause_session());
    }

    pub fn suspend_all_media_playback_for_group(&self, group: MediaSessionGroupId) {
        self.for_each_session_in_group(group, |session| {
            session.begin_interruption(InterruptionType::PlaybackSuspended)
        });
    }

    pub fn resume_all_media_playback_for_group(&self, group: MediaSessionGroupId) {
        self.for_each_session_in_group(group, |session| {
            session.end_interruption(EndInterruptionFlags::MayResumePlaying)
        });
    }

    pub fn suspend_all_media_buffering_for_group(&self, group: MediaSessionGroupId) {
        self.for_each_session_in_group(group, |session| session.suspend_buffering());
    }

    pub fn resume_all_media_buffering_for_group(&self, group: MediaSessionGroupId) {
        self.for_each_session_in_group(group, |session| session.resume_buffering());
    }

    /// True when any session in the group is paused.
    pub fn media_playback_is_paused(&self, group: MediaSessionGroupId) -> bool {
        let mut paused = false;
        self.for_each_session_in_group(group, |session| {
            paused |= session.state() == SessionState::Paused;
        });
        paused
    }

    pub fn has_active_now_playing_session_in_group(&self, group: MediaSessionGroupId) -> bool {
        let mut active = false;
        self.for_each_session_in_group(group, |session| {
            active |= session.is_active_now_playing_session();
        });
        active
    }

    pub fn stop_all_media_playback_for_process(&self) {
        info!("stopping all media playback");
        self.for_each_session(|session| session.stop_session());
    }

    // === Audio capture sources ===

    pub fn add_audio_capture_source(
        &self,
        source: &Arc<dyn AudioCaptureSource>,
    ) -> CaptureSourceHandle {
        let handle = {
            let mut state = self.state.lock();
            if let Some(existing) = state.capture_sources.find(source) {
                return CaptureSourceHandle(existing);
            }
            CaptureSourceHandle(state.capture_sources.insert(source))
        };
        debug!("added audio capture source {}", handle);
        self.update_session_state();
        handle
    }

    pub fn remove_audio_capture_source(&self, handle: CaptureSourceHandle) -> bool {
        if self.state.lock().capture_sources.remove(handle.0).is_none() {
            return false;
        }
        debug!("removed audio capture source {}", handle);
        self.schedule_update_session_state();
        true
    }

    pub fn capture_source_count(&self) -> usize {
        self.state.lock().capture_sources.len()
    }

    pub fn count_active_audio_capture_sources(&self) -> usize {
        self.capture_source_snapshot()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|source| source.wants_to_capture_audio())
            .count()
    }

    // === Shared audio session ===

    /// Recompute the audio-session category and apply it when it changes.
    pub fn update_session_state(&self) {
        let capture_count = self.count_active_audio_capture_sources();

        let mut audible_audio_video = false;
        let mut audible_web_audio = false;
        self.for_each_session(|session| {
            if !session.can_produce_audio() {
                return;
            }
            match session.media_type() {
                MediaType::WebAudio => audible_web_audio = true,
                _ if session.state() == SessionState::Playing => audible_audio_video = true,
                _ => {}
            }
        });

        let category = if capture_count > 0 {
            AudioSessionCategory::PlayAndRecord
        } else if audible_audio_video {
            AudioSessionCategory::MediaPlayback
        } else if audible_web_audio {
            AudioSessionCategory::AmbientSound
        } else {
            AudioSessionCategory::None
        };

        {
            let mut state = self.state.lock();
            if state.category == category {
                return;
            }
            state.category = category;
        }

        debug!("audio session category -> {:?}", category);
        self.audio_session.set_category(category);
    }

    fn maybe_activate_audio_session(&self) -> bool {
        if !self.active_audio_session_required() {
            debug!("active audio session not required");
            return true;
        }

        let became_active = self.audio_session.try_to_set_active(true);
        self.state.lock().became_active = became_active;
        if became_active {
            debug!("activated audio session");
        } else {
            warn!("failed to activate audio session");
        }
        became_active
    }

    fn maybe_deactivate_audio_session(&self) {
        {
            let state = self.state.lock();
            if !state.became_active || !state.should_deactivate_audio_session {
                return;
            }
        }

        debug!("deactivating audio session");
        self.audio_session.try_to_set_active(false);
        self.state.lock().became_active = false;
    }

    pub fn set_should_deactivate_audio_session(&self, deactivate: bool) {
        self.state.lock().should_deactivate_audio_session = deactivate;
    }

    pub fn should_deactivate_audio_session(&self) -> bool {
        self.state.lock().should_deactivate_audio_session
    }

    // === Platform flags ===

    pub fn set_is_playing_to_automotive_head_unit(&self, playing: bool) {
        let mut state = self.state.lock();
        if state.is_playing_to_automotive_head_unit == playing {
            return;
        }
        info!("playing to automotive head unit: {}", playing);
        state.is_playing_to_automotive_head_unit = playing;
    }

    pub fn is_playing_to_automotive_head_unit(&self) -> bool {
        self.state.lock().is_playing_to_automotive_head_unit
    }

    pub fn set_supports_spatial_audio_playback(&self, supported: bool) {
        let mut state = self.state.lock();
        if state.supports_spatial_audio_playback == Some(supported) {
            return;
        }
        info!("supports spatial audio playback: {}", supported);
        state.supports_spatial_audio_playback = Some(supported);
    }

    /// None until the platform has reported spatial audio support.
    pub fn supports_spatial_audio_playback(&self) -> Option<bool> {
        self.state.lock().supports_spatial_audio_playback
    }

    pub fn decoder_support(&self) -> DecoderConfig {
        self.state.lock().decoders
    }

    pub fn set_decoder_support(&self, decoders: DecoderConfig) {
        self.state.lock().decoders = decoders;
    }

    // === Deferred work ===

    fn schedule_update_session_state(&self) {
        self.schedule(DeferredTask::UpdateSessionState);
    }

    fn schedule_state_log(&self) {
        self.schedule(DeferredTask::DumpSessionStates);
    }

    fn schedule(&self, task: DeferredTask) {
        {
            let mut state = self.state.lock();
            if state.pending[task.index()] {
                return;
            }
            state.pending[task.index()] = true;
        }

        if !self.tasks.enqueue(task) {
            self.state.lock().pending[task.index()] = false;
        }
    }

    fn perform(&self, task: DeferredTask) {
        self.state.lock().pending[task.index()] = false;

        match task {
            DeferredTask::UpdateSessionState => self.update_session_state(),
            DeferredTask::ReevaluateAudioActivation => {
                self.maybe_activate_audio_session();
                self.update_session_state();
            }
            DeferredTask::UpdateNowPlayingInfo => self.update_now_playing_info(),
            DeferredTask::DumpSessionStates => self.dump_session_states(),
        }
    }

    /// Run everything queued so far on the calling context.
    pub fn run_pending_tasks(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.tasks.try_next() {
            self.perform(task);
            ran += 1;
        }
        ran
    }

    pub fn pending_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Async driver for a tokio host. Ends when the arbiter is dropped or shut down.
    pub fn driver(self: &Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let arbiter = Arc::downgrade(self);
        let tasks = Arc::clone(&self.tasks);
        async move {
            while let Some(task) = tasks.next().await {
                let Some(arbiter) = arbiter.upgrade() else {
                    break;
                };
                arbiter.perform(task);
            }
            debug!("deferred task driver stopped");
        }
    }

    /// Token cancelled together with the arbiter's deferred work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.tasks.cancellation_token()
    }

    /// Cancel all deferred work.
    pub fn shutdown(&self) {
        self.tasks.cancel();
    }

    pub fn dump_session_states(&self) {
        let mut dump = String::new();
        let entries: Vec<(SessionHandle, Option<Arc<dyn MediaSession>>)> = {
            let state = self.state.lock();
            state
                .order
                .iter()
                .map(|h| (*h, state.sessions.get(h.0)))
                .collect()
        };
        for (handle, session) in entries {
            let description = session
                .map(|s| s.description())
                .unwrap_or_else(|| "<dropped>".to_string());
            let _ = writeln!(dump, "({}): {}", handle, description);
        }
        info!("sessions:\n{}", dump);
    }

    // === Iteration helpers ===

    fn session_snapshot(&self) -> Vec<Weak<dyn MediaSession>> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|h| state.sessions.weak(h.0))
            .collect()
    }

    fn capture_source_snapshot(&self) -> Vec<Weak<dyn AudioCaptureSource>> {
        self.state
            .lock()
            .capture_sources
            .entries()
            .map(|(_, weak)| weak.clone())
            .collect()
    }

    fn sessions_matching<F>(&self, filter: F) -> Vec<Weak<dyn MediaSession>>
    where
        F: Fn(&dyn MediaSession) -> bool,
    {
        self.session_snapshot()
            .into_iter()
            .filter(|weak| weak.upgrade().is_some_and(|session| filter(session.as_ref())))
            .collect()
    }

    fn for_each_session<F>(&self, mut callback: F)
    where
        F: FnMut(&dyn MediaSession),
    {
        for weak in self.session_snapshot() {
            if let Some(session) = weak.upgrade() {
                callback(session.as_ref());
            }
        }
    }

    fn for_each_matching_session<P, F>(&self, predicate: P, mut callback: F)
    where
        P: Fn(&dyn MediaSession) -> bool,
        F: FnMut(&dyn MediaSession),
    {
        for weak in self.sessions_matching(predicate) {
            if let Some(session) = weak.upgrade() {
                callback(session.as_ref());
            }
        }
    }

    fn for_each_session_in_group<F>(&self, group: MediaSessionGroupId, callback: F)
    where
        F: FnMut(&dyn MediaSession),
    {
        self.for_each_matching_session(|session| session.group_id() == Some(group), callback);
    }

    fn any_of_sessions<F>(&self, predicate: F) -> bool
    where
        F: Fn(&dyn MediaSession) -> bool,
    {
        self.session_snapshot()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|session| predicate(session.as_ref()))
    }
}

impl Drop for SessionArbiter {
    fn drop(&mut self) {
        self.tasks.cancel();
    }
}
