//! Audio announcement sequencer: alert tone at full volume, then the spoken
//! amount, arbitrating volume and speech focus.
//!
//! One sequence is active at a time. Completion signaling is the resolution
//! of the tone/speech futures themselves; a new `announce` while a sequence
//! is in flight supersedes it, and the dropped sequence's guards restore
//! volume and focus on the way out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::audio::{
    AlertSound, AudioOutput, FocusGuard, SpeechEngine, TonePlayer, VolumeGuard,
};
use crate::speech::announcement_phrase;

/// Grace delay between tone completion and speech start, to avoid output
/// glitching while the stream volume settles.
pub const TONE_SPEECH_GRACE: Duration = Duration::from_millis(300);

/// Speech is boosted for audibility but not to the ceiling the tone uses.
const SPEECH_BOOST_NUMERATOR: u32 = 9;
const SPEECH_BOOST_DENOMINATOR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    PlayingTone,
    AwaitingSpeechFocus,
    Speaking,
    Done,
    Fallback,
}

pub struct AnnouncerDeps {
    pub output: Arc<dyn AudioOutput>,
    pub tone: Arc<dyn TonePlayer>,
    pub speech: Arc<dyn SpeechEngine>,
    pub alert: Arc<dyn AlertSound>,
}

#[derive(Clone)]
pub struct AnnouncerHandle {
    tx: mpsc::Sender<i64>,
    stage: watch::Receiver<Stage>,
}

impl AnnouncerHandle {
    /// Queue an announcement. A sequence already in flight is flushed rather
    /// than overlapped.
    pub async fn announce(&self, amount: i64) {
        if self.tx.send(amount).await.is_err() {
            warn!("announcer task gone, dropping announcement");
        }
    }

    pub fn stage(&self) -> Stage {
        *self.stage.borrow()
    }

    /// Wait until the current sequence reaches a terminal stage. Test helper.
    pub async fn settled(&self) -> Stage {
        let mut rx = self.stage.clone();
        loop {
            let stage = *rx.borrow_and_update();
            if matches!(stage, Stage::Done | Stage::Fallback) {
                return stage;
            }
            if rx.changed().await.is_err() {
                return stage;
            }
        }
    }
}

pub struct Announcer;

impl Announcer {
    pub fn spawn(deps: AnnouncerDeps) -> AnnouncerHandle {
        Self::spawn_with_grace(deps, TONE_SPEECH_GRACE)
    }

    pub fn spawn_with_grace(deps: AnnouncerDeps, grace: Duration) -> AnnouncerHandle {
        let (tx, rx) = mpsc::channel(8);
        let (stage_tx, stage_rx) = watch::channel(Stage::Idle);
        tokio::spawn(run(rx, stage_tx, deps, grace));
        AnnouncerHandle {
            tx,
            stage: stage_rx,
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<i64>,
    stage_tx: watch::Sender<Stage>,
    deps: AnnouncerDeps,
    grace: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut amount = first;
        loop {
            let sequence = run_sequence(&deps, &stage_tx, amount, grace);
            tokio::pin!(sequence);
            tokio::select! {
                biased;
                next = rx.recv() => match next {
                    Some(superseding) => {
                        // Dropping the in-flight sequence releases its volume
                        // and focus guards before the next one starts.
                        debug!(amount, superseding, "flushing in-flight announcement");
                        amount = superseding;
                    }
                    None => return,
                },
                _ = &mut sequence => break,
            }
        }
    }
}

async fn run_sequence(
    deps: &AnnouncerDeps,
    stage_tx: &watch::Sender<Stage>,
    amount: i64,
    grace: Duration,
) {
    // Engine never initialized: short-circuit to the default alert sound.
    if !deps.speech.is_ready() {
        warn!("speech engine not ready, falling back to alert sound");
        deps.alert.ring();
        stage_tx.send_replace(Stage::Fallback);
        return;
    }

    stage_tx.send_replace(Stage::PlayingTone);
    let tone_result = {
        let _volume = VolumeGuard::raise_to(deps.output.clone(), deps.output.max_volume());
        deps.tone.play().await
        // volume restored here, before any speech starts
    };

    let focus = match tone_result {
        Ok(()) => {
            tokio::time::sleep(grace).await;
            stage_tx.send_replace(Stage::AwaitingSpeechFocus);
            match FocusGuard::acquire(deps.output.clone()) {
                Ok(focus) => Some(focus),
                Err(err) => {
                    warn!(error = %err, "speech focus denied, falling back to alert sound");
                    deps.alert.ring();
                    stage_tx.send_replace(Stage::Fallback);
                    return;
                }
            }
        }
        Err(err) => {
            // Tone failure skips the separate focus acquire and goes straight
            // to speech.
            warn!(error = %err, "tone playback failed, speaking without focus");
            None
        }
    };

    stage_tx.send_replace(Stage::Speaking);
    let boost =
        (deps.output.max_volume() * SPEECH_BOOST_NUMERATOR) / SPEECH_BOOST_DENOMINATOR;
    let speech_result = {
        let _volume = VolumeGuard::raise_to(deps.output.clone(), boost);
        deps.speech.speak(&announcement_phrase(amount)).await
    };
    drop(focus);

    match speech_result {
        Ok(()) => {
            info!(amount, "announcement completed");
            stage_tx.send_replace(Stage::Done);
        }
        Err(err) => {
            warn!(error = %err, "speech failed, ringing default alert");
            deps.alert.ring();
            stage_tx.send_replace(Stage::Fallback);
        }
    }
}
