//! Seams over the device audio hardware: tone playback, speech synthesis,
//! output volume, exclusive speech focus, and the wake hold.
//!
//! Volume and focus are exclusive resources; `VolumeGuard` and `FocusGuard`
//! restore/release on drop so every exit path out of an announcement
//! (completion, error, supersede-cancellation) gives back what it acquired.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("tone playback failed: {0}")]
    Tone(String),
    #[error("speech synthesis failed: {0}")]
    Speech(String),
    #[error("speech engine not initialized")]
    EngineNotReady,
    #[error("audio focus unavailable")]
    FocusDenied,
}

/// Output mixer: stream volume plus exclusive speech focus.
pub trait AudioOutput: Send + Sync {
    fn volume(&self) -> u32;
    fn max_volume(&self) -> u32;
    fn set_volume(&self, level: u32);
    fn request_focus(&self) -> Result<(), AudioError>;
    fn abandon_focus(&self);
}

/// Alert tone playback; `play` resolves once playback has fully completed or
/// failed, which is what serializes tone-then-speech.
#[async_trait::async_trait]
pub trait TonePlayer: Send + Sync {
    async fn play(&self) -> Result<(), AudioError>;
}

/// Speech synthesis engine. `is_ready` reflects whether initialization ever
/// succeeded; `speak` resolves on utterance completion.
#[async_trait::async_trait]
pub trait SpeechEngine: Send + Sync {
    fn is_ready(&self) -> bool;
    async fn speak(&self, text: &str) -> Result<(), AudioError>;
}

/// Platform default alert sound, the terminal fallback when the richer
/// sequence cannot run. Must never fail loudly.
pub trait AlertSound: Send + Sync {
    fn ring(&self);
}

/// Sets the output volume and restores the saved level on drop.
pub struct VolumeGuard {
    output: Arc<dyn AudioOutput>,
    original: u32,
}

impl VolumeGuard {
    pub fn raise_to(output: Arc<dyn AudioOutput>, target: u32) -> Self {
        let original = output.volume();
        output.set_volume(target);
        debug!(original, target, "output volume raised");
        Self { output, original }
    }
}

impl Drop for VolumeGuard {
    fn drop(&mut self) {
        self.output.set_volume(self.original);
        debug!(restored = self.original, "output volume restored");
    }
}

/// Exclusive speech focus; released on drop.
pub struct FocusGuard {
    output: Arc<dyn AudioOutput>,
}

impl FocusGuard {
    pub fn acquire(output: Arc<dyn AudioOutput>) -> Result<Self, AudioError> {
        output.request_focus()?;
        Ok(Self { output })
    }
}

impl Drop for FocusGuard {
    fn drop(&mut self) {
        self.output.abandon_focus();
    }
}

/// Bounded-duration wake hold. The hold lapses at its ceiling even if the
/// guard is leaked by a stuck sequence.
pub struct WakeGuard {
    held: Arc<AtomicBool>,
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

pub trait WakeSource: Send + Sync {
    fn acquire(&self, ceiling: Duration) -> WakeGuard;
}

/// Silent, sound-less status notification surface. The announcement sequencer
/// owns the audible channel exclusively, so implementations must not attach
/// their own sound or vibration.
pub trait Notifier: Send + Sync {
    fn notify_silent(&self, title: &str, body: &str);
}

/// In-memory, scriptable implementations used by tests and embedders without
/// real hardware.
pub mod stub {
    use super::*;

    pub struct StubAudio {
        volume: Mutex<u32>,
        max: u32,
        pub volume_changes: Mutex<Vec<u32>>,
        focus_held: AtomicBool,
        pub deny_focus: AtomicBool,
    }

    impl StubAudio {
        pub fn new(volume: u32, max: u32) -> Self {
            Self {
                volume: Mutex::new(volume),
                max,
                volume_changes: Mutex::new(Vec::new()),
                focus_held: AtomicBool::new(false),
                deny_focus: AtomicBool::new(false),
            }
        }

        pub fn focus_held(&self) -> bool {
            self.focus_held.load(Ordering::SeqCst)
        }
    }

    impl AudioOutput for StubAudio {
        fn volume(&self) -> u32 {
            *self.volume.lock().expect("stub audio poisoned")
        }

        fn max_volume(&self) -> u32 {
            self.max
        }

        fn set_volume(&self, level: u32) {
            *self.volume.lock().expect("stub audio poisoned") = level;
            self.volume_changes
                .lock()
                .expect("stub audio poisoned")
                .push(level);
        }

        fn request_focus(&self) -> Result<(), AudioError> {
            if self.deny_focus.load(Ordering::SeqCst) {
                return Err(AudioError::FocusDenied);
            }
            self.focus_held.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn abandon_focus(&self) {
            self.focus_held.store(false, Ordering::SeqCst);
        }
    }

    pub struct StubTone {
        pub fail: AtomicBool,
        pub played: AtomicU32,
        pub duration: Duration,
    }

    impl StubTone {
        pub fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                played: AtomicU32::new(0),
                duration: Duration::from_millis(10),
            }
        }

        pub fn failing() -> Self {
            let tone = Self::new();
            tone.fail.store(true, Ordering::SeqCst);
            tone
        }
    }

    impl Default for StubTone {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl TonePlayer for StubTone {
        async fn play(&self) -> Result<(), AudioError> {
            tokio::time::sleep(self.duration).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(AudioError::Tone("stub tone error".into()));
            }
            self.played.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub struct StubSpeech {
        ready: bool,
        pub fail: AtomicBool,
        pub spoken: Mutex<Vec<String>>,
        pub duration: Duration,
    }

    impl StubSpeech {
        pub fn new() -> Self {
            Self {
                ready: true,
                fail: AtomicBool::new(false),
                spoken: Mutex::new(Vec::new()),
                duration: Duration::from_millis(10),
            }
        }

        pub fn uninitialized() -> Self {
            Self {
                ready: false,
                ..Self::new()
            }
        }
    }

    impl Default for StubSpeech {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl SpeechEngine for StubSpeech {
        fn is_ready(&self) -> bool {
            self.ready
        }

        async fn speak(&self, text: &str) -> Result<(), AudioError> {
            tokio::time::sleep(self.duration).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(AudioError::Speech("stub speech error".into()));
            }
            self.spoken
                .lock()
                .expect("stub speech poisoned")
                .push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct StubAlert {
        pub rings: AtomicU32,
    }

    impl AlertSound for StubAlert {
        fn ring(&self) {
            self.rings.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub struct StubWake {
        pub held: Arc<AtomicBool>,
    }

    impl WakeSource for StubWake {
        fn acquire(&self, ceiling: Duration) -> WakeGuard {
            self.held.store(true, Ordering::SeqCst);
            let held = self.held.clone();
            // Ceiling release runs regardless of what happens to the guard.
            tokio::spawn(async move {
                tokio::time::sleep(ceiling).await;
                if held.swap(false, Ordering::SeqCst) {
                    warn!("wake hold hit its ceiling before release");
                }
            });
            WakeGuard {
                held: self.held.clone(),
            }
        }
    }

    #[derive(Default)]
    pub struct StubNotifier {
        pub posted: Mutex<Vec<(String, String)>>,
    }

    impl Notifier for StubNotifier {
        fn notify_silent(&self, title: &str, body: &str) {
            self.posted
                .lock()
                .expect("stub notifier poisoned")
                .push((title.to_string(), body.to_string()));
        }
    }
}
