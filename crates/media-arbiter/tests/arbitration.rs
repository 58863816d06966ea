//! Integration tests for session arbitration
//!
//! Drives a SessionArbiter with simulated sessions that re-enter it the way
//! media elements do.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use media_arbiter::scenario::SessionSpec;
use media_arbiter::{
    AudioSessionCategory, EndInterruptionFlags, InterruptionType, MediaSession,
    MediaSessionGroupId, MediaType, PlaybackControlsPurpose, RemoteCommandArgument,
    RemoteControlCommand, SessionArbiter, SessionRestrictions, SessionState,
    SimulatedAudioSession, SimulatedSession,
};

fn setup() -> (Arc<SessionArbiter>, Arc<SimulatedAudioSession>) {
    let audio = SimulatedAudioSession::new();
    (SessionArbiter::new(audio.clone()), audio)
}

fn spec(name: &str, media_type: MediaType) -> SessionSpec {
    SessionSpec {
        name: name.to_string(),
        media_type,
        group: None,
        can_produce_audio: true,
        requires_audio_session: None,
        can_play_concurrently: false,
        remote_commands: true,
        supports_seeking: true,
        title: None,
    }
}

fn session(
    arbiter: &Arc<SessionArbiter>,
    name: &str,
    media_type: MediaType,
) -> Arc<SimulatedSession> {
    let session = SimulatedSession::new(&spec(name, media_type), None, arbiter);
    session.register();
    session
}

fn order(arbiter: &SessionArbiter, sessions: &[&Arc<SimulatedSession>]) -> Vec<String> {
    arbiter
        .session_handles()
        .into_iter()
        .map(|handle| {
            sessions
                .iter()
                .find(|s| s.handle() == Some(handle))
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| handle.to_string())
        })
        .collect()
}

#[test]
fn test_registry_never_holds_duplicates() {
    let (arbiter, _audio) = setup();
    let a = SimulatedSession::new(&spec("a", MediaType::Video), None, &arbiter);
    let b = SimulatedSession::new(&spec("b", MediaType::Audio), None, &arbiter);

    let dyn_a: Arc<dyn MediaSession> = a.clone();
    let first = arbiter.add_session(&dyn_a);
    let second = arbiter.add_session(&dyn_a);
    assert_eq!(first, second);
    assert_eq!(arbiter.session_count(), 1);
    assert_eq!(a.register(), Some(first));

    b.register();
    a.unregister();
    a.register();
    b.unregister();
    b.register();

    let handles = arbiter.session_handles();
    assert_eq!(handles.len(), 2);
    assert_ne!(handles[0], handles[1]);
    assert_eq!(order(&arbiter, &[&a, &b]), vec!["a", "b"]);
}

#[test]
fn test_set_current_session() {
    let (arbiter, _audio) = setup();
    let only = session(&arbiter, "only", MediaType::Audio);
    let only_handle = only.handle().unwrap();

    arbiter.set_current_session(only_handle);
    assert_eq!(arbiter.current_session_handle(), Some(only_handle));

    let second = session(&arbiter, "second", MediaType::Audio);
    let third = session(&arbiter, "third", MediaType::Audio);
    arbiter.set_current_session(third.handle().unwrap());

    assert_eq!(arbiter.current_session_handle(), third.handle());
    assert_eq!(order(&arbiter, &[&only, &second, &third]), vec!["third", "only", "second"]);
    assert_eq!(arbiter.current_session().unwrap().log_identifier(), "third");
}

#[test]
fn test_interrupted_playback_not_permitted_denies_admission() {
    let (arbiter, _audio) = setup();
    arbiter.add_restriction(
        MediaType::Audio,
        SessionRestrictions::INTERRUPTED_PLAYBACK_NOT_PERMITTED,
    );
    let music = session(&arbiter, "music", MediaType::Audio);
    assert!(music.play());

    arbiter.begin_interruption(InterruptionType::SystemInterruption);
    assert_eq!(music.state(), SessionState::Interrupted);

    assert!(!music.play());
    assert_eq!(music.state(), SessionState::Interrupted);
    assert_eq!(
        arbiter.current_interruption(),
        Some(InterruptionType::SystemInterruption)
    );
}

#[test]
fn test_failed_activation_denies_admission() {
    let (arbiter, audio) = setup();
    let music = session(&arbiter, "music", MediaType::Audio);

    audio.set_allow_activation(false);
    assert!(!music.play());
    assert_eq!(music.state(), SessionState::Idle);

    audio.set_allow_activation(true);
    assert!(music.play());
    assert!(audio.is_active());
    assert_eq!(audio.category(), AudioSessionCategory::MediaPlayback);
}

#[test]
fn test_concurrent_playback_pauses_competitors() {
    let (arbiter, _audio) = setup();
    arbiter.add_restriction(
        MediaType::Video,
        SessionRestrictions::CONCURRENT_PLAYBACK_NOT_PERMITTED,
    );
    let first = session(&arbiter, "first", MediaType::Video);
    let second = session(&arbiter, "second", MediaType::Video);
    let podcast = session(&arbiter, "podcast", MediaType::Audio);

    assert!(podcast.play());
    assert!(first.play());
    assert!(second.play());

    assert_eq!(first.state(), SessionState::Paused);
    assert_eq!(first.events(), vec!["pause"]);
    assert_eq!(second.state(), SessionState::Playing);
    assert_eq!(podcast.state(), SessionState::Playing);
    assert!(podcast.events().is_empty());
}

/// Unregisters another session from inside its interruption callback.
struct Remover {
    victim: Arc<SimulatedSession>,
    interruptions: AtomicUsize,
}

impl MediaSession for Remover {
    fn media_type(&self) -> MediaType {
        MediaType::Video
    }

    fn state(&self) -> SessionState {
        SessionState::Idle
    }

    fn can_produce_audio(&self) -> bool {
        false
    }

    fn active_audio_session_required(&self) -> bool {
        false
    }

    fn can_play_concurrently(&self, _other: &dyn MediaSession) -> bool {
        true
    }

    fn can_receive_remote_control_commands(&self) -> bool {
        false
    }

    fn did_receive_remote_control_command(
        &self,
        _command: RemoteControlCommand,
        _argument: &RemoteCommandArgument,
    ) {
    }

    fn supports_seeking(&self) -> bool {
        false
    }

    fn is_active_now_playing_session(&self) -> bool {
        false
    }

    fn begin_interruption(&self, _interruption: InterruptionType) {
        self.interruptions.fetch_add(1, Ordering::SeqCst);
        self.victim.unregister();
    }

    fn end_interruption(&self, _flags: EndInterruptionFlags) {}

    fn pause_session(&self) {}

    fn stop_session(&self) {}

    fn suspend_buffering(&self) {}

    fn resume_buffering(&self) {}

    fn group_id(&self) -> Option<MediaSessionGroupId> {
        None
    }

    fn log_identifier(&self) -> String {
        "remover".to_string()
    }
}

#[test]
fn test_fan_out_survives_removal_mid_iteration() {
    let (arbiter, _audio) = setup();
    let victim = SimulatedSession::new(&spec("victim", MediaType::Audio), None, &arbiter);
    let remover = Arc::new(Remover {
        victim: victim.clone(),
        interruptions: AtomicUsize::new(0),
    });
    let remover_dyn: Arc<dyn MediaSession> = remover.clone();
    let remover_handle = arbiter.add_session(&remover_dyn);
    victim.register();
    let tail = session(&arbiter, "tail", MediaType::Audio);

    arbiter.begin_interruption(InterruptionType::SystemInterruption);

    assert_eq!(remover.interruptions.load(Ordering::SeqCst), 1);
    assert_eq!(victim.events(), vec!["begin SystemInterruption"]);
    assert_eq!(tail.events(), vec!["begin SystemInterruption"]);
    assert_eq!(
        arbiter.session_handles(),
        vec![remover_handle, tail.handle().unwrap()]
    );

    arbiter.end_interruption(EndInterruptionFlags::NoFlags);
    assert_eq!(victim.events().len(), 1);
    assert_eq!(tail.events().len(), 2);
}

#[test]
fn test_dropping_session_unregisters_it() {
    let (arbiter, _audio) = setup();
    let keep = session(&arbiter, "keep", MediaType::Audio);
    let gone = session(&arbiter, "gone", MediaType::Audio);
    let gone_handle = gone.handle().unwrap();
    drop(gone);

    assert!(!arbiter.is_registered(gone_handle));
    assert_eq!(arbiter.session_handles(), vec![keep.handle().unwrap()]);

    arbiter.begin_interruption(InterruptionType::SystemSleep);
    assert_eq!(keep.events(), vec!["begin SystemSleep"]);
    assert_eq!(arbiter.count(MediaType::Audio), 1);
}

#[test]
fn test_inactive_application_interrupts_restricted_types() {
    let (arbiter, _audio) = setup();
    arbiter.add_restriction(
        MediaType::Video,
        SessionRestrictions::INACTIVE_PROCESS_PLAYBACK_RESTRICTED,
    );
    let clip = session(&arbiter, "clip", MediaType::Video);
    let podcast = session(&arbiter, "podcast", MediaType::Audio);
    assert!(clip.play());
    assert!(podcast.play());

    arbiter.application_will_become_inactive();
    arbiter.application_will_become_inactive();
    assert_eq!(clip.events(), vec!["begin ProcessInactive"]);
    assert_eq!(clip.state(), SessionState::Interrupted);
    assert!(podcast.events().is_empty());
    assert_eq!(podcast.state(), SessionState::Playing);

    arbiter.application_did_become_active();
    arbiter.application_did_become_active();
    assert_eq!(
        clip.events(),
        vec!["begin ProcessInactive", "end MayResumePlaying"]
    );
    assert_eq!(clip.state(), SessionState::Playing);
    assert!(podcast.events().is_empty());
}

#[test]
fn test_wireless_target_change_interrupts_in_background() {
    let (arbiter, _audio) = setup();
    arbiter.add_restriction(
        MediaType::Video,
        SessionRestrictions::BACKGROUND_PROCESS_PLAYBACK_RESTRICTED,
    );
    let clip = session(&arbiter, "clip", MediaType::Video);
    let podcast = session(&arbiter, "podcast", MediaType::Audio);
    assert!(clip.play());
    assert!(podcast.play());

    // foreground: nothing happens
    arbiter.session_is_playing_to_wireless_playback_target_changed(clip.handle().unwrap());
    assert!(clip.events().is_empty());
    assert_eq!(clip.state(), SessionState::Playing);

    arbiter.application_did_enter_background(false);
    assert_eq!(clip.events(), vec!["begin EnteringBackground"]);

    // started after the transition, so still playing
    let late = session(&arbiter, "late", MediaType::Video);
    assert!(late.play());
    arbiter.session_is_playing_to_wireless_playback_target_changed(late.handle().unwrap());
    assert_eq!(late.events(), vec!["begin EnteringBackground"]);
    assert_eq!(late.state(), SessionState::Interrupted);

    // already interrupted sessions are left alone
    arbiter.session_is_playing_to_wireless_playback_target_changed(late.handle().unwrap());
    arbiter.session_is_playing_to_wireless_playback_target_changed(clip.handle().unwrap());
    assert_eq!(late.events(), vec!["begin EnteringBackground"]);
    assert_eq!(clip.events(), vec!["begin EnteringBackground"]);

    // unrestricted media type
    arbiter.session_is_playing_to_wireless_playback_target_changed(podcast.handle().unwrap());
    assert!(podcast.events().is_empty());
    assert_eq!(podcast.state(), SessionState::Playing);
}

#[test]
fn test_background_transitions_are_idempotent() {
    let (arbiter, _audio) = setup();
    arbiter.add_restriction(
        MediaType::Video,
        SessionRestrictions::BACKGROUND_PROCESS_PLAYBACK_RESTRICTED,
    );
    arbiter.add_restriction(
        MediaType::Audio,
        SessionRestrictions::SUSPENDED_UNDER_LOCK_PLAYBACK_RESTRICTED,
    );
    let podcast = session(&arbiter, "podcast", MediaType::Audio);
    let clip = session(&arbiter, "clip", MediaType::Video);
    assert!(podcast.play());
    assert!(clip.play());

    arbiter.application_did_enter_background(false);
    arbiter.application_did_enter_background(false);
    assert!(arbiter.is_application_in_background());
    assert!(podcast.events().is_empty());
    assert_eq!(clip.events(), vec!["begin EnteringBackground"]);

    arbiter.application_will_enter_foreground(false);
    arbiter.application_will_enter_foreground(false);
    assert!(podcast.events().is_empty());
    assert_eq!(
        clip.events(),
        vec!["begin EnteringBackground", "end MayResumePlaying"]
    );
    assert_eq!(clip.state(), SessionState::Playing);
}

#[test]
fn test_suspended_under_lock_round_trip() {
    let (arbiter, _audio) = setup();
    arbiter.add_restriction(
        MediaType::Audio,
        SessionRestrictions::SUSPENDED_UNDER_LOCK_PLAYBACK_RESTRICTED,
    );
    let podcast = session(&arbiter, "podcast", MediaType::Audio);
    assert!(podcast.play());

    arbiter.application_did_enter_background(true);
    assert_eq!(podcast.events(), vec!["begin SuspendedUnderLock"]);
    assert_eq!(podcast.state(), SessionState::Interrupted);

    arbiter.application_will_enter_foreground(true);
    assert_eq!(
        podcast.events(),
        vec!["begin SuspendedUnderLock", "end MayResumePlaying"]
    );
    assert_eq!(podcast.state(), SessionState::Playing);
}

#[test]
fn test_pausing_session_moves_behind_playing_run() {
    let (arbiter, _audio) = setup();
    let a = session(&arbiter, "a", MediaType::Audio);
    let b = session(&arbiter, "b", MediaType::Audio);
    let c = session(&arbiter, "c", MediaType::Audio);

    assert!(c.play());
    c.pause();
    assert!(b.play());
    assert!(a.play());
    assert_eq!(order(&arbiter, &[&a, &b, &c]), vec!["a", "b", "c"]);

    a.pause();
    assert_eq!(order(&arbiter, &[&a, &b, &c]), vec!["b", "a", "c"]);
}

#[test]
fn test_pausing_ahead_of_no_playing_session_is_noop() {
    let (arbiter, _audio) = setup();
    let a = session(&arbiter, "a", MediaType::Audio);
    let b = session(&arbiter, "b", MediaType::Audio);

    assert!(a.play());
    a.pause();
    assert_eq!(order(&arbiter, &[&a, &b]), vec!["a", "b"]);
}

#[test]
fn test_removing_unknown_session_is_noop() {
    let (arbiter, _audio) = setup();
    let a = session(&arbiter, "a", MediaType::Audio);
    let b = session(&arbiter, "b", MediaType::Audio);
    let stale = b.handle().unwrap();
    assert!(b.unregister());

    let before = arbiter.session_handles();
    assert!(!arbiter.remove_session(stale));
    assert_eq!(arbiter.session_handles(), before);
    assert_eq!(order(&arbiter, &[&a]), vec!["a"]);
}

#[test]
fn test_remote_controls_prefer_audio_video_sessions() {
    let (arbiter, _audio) = setup();
    let web = session(&arbiter, "web", MediaType::WebAudio);
    let video = session(&arbiter, "video", MediaType::Video);
    arbiter.set_current_session(web.handle().unwrap());

    let best = arbiter
        .best_eligible_session_for_remote_controls(|_| true, PlaybackControlsPurpose::NowPlaying)
        .unwrap();
    assert_eq!(best.log_identifier(), "video");

    video.unregister();
    let best = arbiter
        .best_eligible_session_for_remote_controls(|_| true, PlaybackControlsPurpose::NowPlaying)
        .unwrap();
    assert_eq!(best.log_identifier(), "web");

    assert!(arbiter
        .best_eligible_session_for_remote_controls(|_| false, PlaybackControlsPurpose::ControlsManager)
        .is_none());
}

#[test]
fn test_remote_command_reaches_current_session() {
    let (arbiter, _audio) = setup();
    let a = session(&arbiter, "a", MediaType::Audio);
    let b = session(&arbiter, "b", MediaType::Audio);
    assert!(b.play());

    arbiter.process_did_receive_remote_control_command(
        RemoteControlCommand::TogglePlayPause,
        &RemoteCommandArgument::default(),
    );

    assert_eq!(b.state(), SessionState::Paused);
    assert_eq!(b.events(), vec!["remote TogglePlayPause"]);
    assert!(a.events().is_empty());
}

#[test]
fn test_empty_arbiter_requires_no_audio_session() {
    let (arbiter, _audio) = setup();
    assert!(!arbiter.active_audio_session_required());
    assert!(arbiter.has_no_session());
    assert_eq!(arbiter.count_active_audio_capture_sources(), 0);
    assert!(!arbiter.can_produce_audio());
}

#[test]
fn test_group_operations() {
    let (arbiter, _audio) = setup();
    let page = MediaSessionGroupId::new();
    let in_page =
        SimulatedSession::new(&spec("in_page", MediaType::VideoAudio), Some(page), &arbiter);
    in_page.register();
    let elsewhere = session(&arbiter, "elsewhere", MediaType::Audio);
    assert!(in_page.play());
    assert!(elsewhere.play());

    assert!(arbiter.has_active_now_playing_session_in_group(page));
    arbiter.suspend_all_media_buffering_for_group(page);
    assert!(in_page.is_buffering_suspended());
    assert!(!elsewhere.is_buffering_suspended());

    arbiter.pause_all_media_playback_for_group(page);
    assert!(arbiter.media_playback_is_paused(page));
    assert_eq!(elsewhere.state(), SessionState::Playing);

    arbiter.stop_all_media_playback_for_process();
    assert_eq!(in_page.state(), SessionState::Idle);
    assert_eq!(elsewhere.state(), SessionState::Idle);
}

#[test]
fn test_suspend_and_resume_toggle_audio_session() {
    let (arbiter, audio) = setup();
    let music = session(&arbiter, "music", MediaType::Audio);
    assert!(music.play());
    assert!(audio.is_active());

    arbiter.process_will_suspend();
    arbiter.process_will_suspend();
    assert!(!audio.is_active());
    assert_eq!(music.events(), vec!["process suspended true"]);

    arbiter.process_did_resume();
    assert!(audio.is_active());
    assert!(arbiter.has_active_audio_session());
    assert_eq!(
        music.events(),
        vec!["process suspended true", "process suspended false"]
    );
}

#[test]
fn test_sleep_is_skipped_during_interruption() {
    let (arbiter, _audio) = setup();
    let music = session(&arbiter, "music", MediaType::Audio);

    arbiter.begin_interruption(InterruptionType::SystemInterruption);
    arbiter.process_system_will_sleep();
    assert_eq!(music.events(), vec!["begin SystemInterruption"]);

    arbiter.end_interruption(EndInterruptionFlags::NoFlags);
    arbiter.process_system_will_sleep();
    arbiter.process_system_did_wake();
    assert_eq!(
        music.events(),
        vec![
            "begin SystemInterruption",
            "end NoFlags",
            "begin SystemSleep",
            "end MayResumePlaying"
        ]
    );
}

#[tokio::test]
async fn test_async_driver_applies_deferred_updates() {
    let (arbiter, audio) = setup();
    let driver = tokio::spawn(arbiter.driver());

    let ambient = session(&arbiter, "ambient", MediaType::WebAudio);
    for _ in 0..100 {
        if audio.category() == AudioSessionCategory::AmbientSound {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(audio.category(), AudioSessionCategory::AmbientSound);

    ambient.unregister();
    drop(arbiter);

    tokio::time::timeout(Duration::from_secs(1), driver)
        .await
        .expect("driver outlived the arbiter")
        .unwrap();
}
