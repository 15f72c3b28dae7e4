use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use device_agent::announcer::{Announcer, AnnouncerDeps, Stage};
use device_agent::audio::stub::{StubAlert, StubAudio, StubSpeech, StubTone};
use device_agent::audio::AudioOutput;

struct Fixture {
    audio: Arc<StubAudio>,
    tone: Arc<StubTone>,
    speech: Arc<StubSpeech>,
    alert: Arc<StubAlert>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            audio: Arc::new(StubAudio::new(5, 15)),
            tone: Arc::new(StubTone::new()),
            speech: Arc::new(StubSpeech::new()),
            alert: Arc::new(StubAlert::default()),
        }
    }

    fn deps(&self) -> AnnouncerDeps {
        AnnouncerDeps {
            output: self.audio.clone(),
            tone: self.tone.clone(),
            speech: self.speech.clone(),
            alert: self.alert.clone(),
        }
    }
}

fn spawn(fixture: &Fixture) -> device_agent::AnnouncerHandle {
    Announcer::spawn_with_grace(fixture.deps(), Duration::from_millis(1))
}

#[tokio::test]
async fn full_sequence_reaches_done_and_restores_volume() {
    let fx = Fixture::new();
    let handle = spawn(&fx);

    handle.announce(15_000).await;
    assert_eq!(handle.settled().await, Stage::Done);

    assert_eq!(fx.tone.played.load(Ordering::SeqCst), 1);
    let spoken = fx.speech.spoken.lock().unwrap().clone();
    assert_eq!(
        spoken,
        vec!["Pembayaran lima belas ribu rupiah, berhasil diterima".to_string()]
    );
    // tone at max (15), restored (5), speech boost (13 = 90% of 15), restored (5)
    assert_eq!(*fx.audio.volume_changes.lock().unwrap(), vec![15, 5, 13, 5]);
    assert_eq!(fx.audio.volume(), 5);
    assert!(!fx.audio.focus_held());
    assert_eq!(fx.alert.rings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tone_error_still_speaks_and_restores_volume() {
    let fx = Fixture::new();
    fx.tone.fail.store(true, Ordering::SeqCst);
    let handle = spawn(&fx);

    handle.announce(2_000).await;
    assert_eq!(handle.settled().await, Stage::Done);

    // speech ran despite the tone failure, without the focus acquire step
    assert_eq!(fx.speech.spoken.lock().unwrap().len(), 1);
    assert_eq!(fx.audio.volume(), 5, "volume must be restored after tone error");
    assert!(!fx.audio.focus_held());
    assert_eq!(fx.alert.rings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn speech_error_rings_fallback_and_releases_focus() {
    let fx = Fixture::new();
    fx.speech.fail.store(true, Ordering::SeqCst);
    let handle = spawn(&fx);

    handle.announce(10_000).await;
    assert_eq!(handle.settled().await, Stage::Fallback);

    assert_eq!(fx.alert.rings.load(Ordering::SeqCst), 1);
    assert_eq!(fx.audio.volume(), 5);
    assert!(!fx.audio.focus_held());
}

#[tokio::test]
async fn uninitialized_engine_short_circuits_to_fallback() {
    let fx = Fixture::new();
    let deps = AnnouncerDeps {
        speech: Arc::new(StubSpeech::uninitialized()),
        ..fx.deps()
    };
    let handle = Announcer::spawn_with_grace(deps, Duration::from_millis(1));

    handle.announce(5_000).await;
    assert_eq!(handle.settled().await, Stage::Fallback);

    assert_eq!(fx.alert.rings.load(Ordering::SeqCst), 1);
    assert_eq!(fx.tone.played.load(Ordering::SeqCst), 0, "tone must not play");
    assert!(fx.audio.volume_changes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn focus_denied_falls_back_with_volume_intact() {
    let fx = Fixture::new();
    fx.audio.deny_focus.store(true, Ordering::SeqCst);
    let handle = spawn(&fx);

    handle.announce(20_000).await;
    assert_eq!(handle.settled().await, Stage::Fallback);

    assert_eq!(fx.alert.rings.load(Ordering::SeqCst), 1);
    assert_eq!(fx.audio.volume(), 5);
    assert!(fx.speech.spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn second_announce_supersedes_the_first() {
    let fx = Fixture::new();
    // long tone so the first sequence is still playing when the second lands
    let tone = Arc::new(StubTone {
        duration: Duration::from_millis(250),
        ..StubTone::new()
    });
    let deps = AnnouncerDeps {
        tone: tone.clone(),
        ..fx.deps()
    };
    let handle = Announcer::spawn_with_grace(deps, Duration::from_millis(1));

    handle.announce(1_000).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.announce(2_000).await;
    assert_eq!(handle.settled().await, Stage::Done);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let spoken = fx.speech.spoken.lock().unwrap().clone();
    assert_eq!(
        spoken,
        vec!["Pembayaran dua ribu rupiah, berhasil diterima".to_string()],
        "flushed announcement must not reach speech"
    );
    assert_eq!(fx.audio.volume(), 5, "flushed sequence must restore volume");
    assert!(!fx.audio.focus_held());
}
