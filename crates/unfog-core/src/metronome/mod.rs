//! Beat scheduling for rhythmic cueing.
//!
//! A [`Metronome`] calls [`Pulse::pulse`] once per beat on a tokio task. The
//! first beat fires one interval after [`Metronome::start`], matching a
//! repeating timer. Starting again while running replaces the beat loop, so
//! a tempo change takes effect on the next beat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::settings::Tempo;

/// Something that produces one cue (haptic tap, click, flash).
pub trait Pulse: Send + Sync {
    /// Emit one beat.
    fn pulse(&self);
}

impl<F> Pulse for F
where
    F: Fn() + Send + Sync,
{
    fn pulse(&self) {
        self();
    }
}

/// Drives a [`Pulse`] at a [`Tempo`].
pub struct Metronome {
    pulse: Arc<dyn Pulse>,
    task: Option<JoinHandle<()>>,
    tempo: Option<Tempo>,
    beats: Arc<AtomicU64>,
}

impl std::fmt::Debug for Metronome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metronome")
            .field("tempo", &self.tempo)
            .field("running", &self.is_running())
            .field("beats", &self.beats())
            .finish_non_exhaustive()
    }
}

impl Metronome {
    /// Create a stopped metronome.
    pub fn new(pulse: Arc<dyn Pulse>) -> Self {
        Self {
            pulse,
            task: None,
            tempo: None,
            beats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start beating at `tempo`, replacing any running loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, tempo: Tempo) {
        self.stop();

        let period = tempo.beat_interval();
        let pulse = Arc::clone(&self.pulse);
        let beats = Arc::clone(&self.beats);

        tracing::debug!("Metronome started at {} ({:?} per beat)", tempo, period);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                pulse.pulse();
                beats.fetch_add(1, Ordering::Relaxed);
            }
        }));
        self.tempo = Some(tempo);
    }

    /// Stop beating. Does nothing if stopped.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Metronome stopped");
        }
        self.tempo = None;
    }

    /// Whether a beat loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Tempo of the running loop.
    #[must_use]
    pub fn tempo(&self) -> Option<Tempo> {
        self.tempo
    }

    /// Beats emitted since creation.
    #[must_use]
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counting() -> (Arc<AtomicU64>, Arc<dyn Pulse>) {
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let pulse: Arc<dyn Pulse> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, pulse)
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_follow_tempo() {
        let (count, pulse) = counting();
        let mut metronome = Metronome::new(pulse);

        metronome.start(Tempo::new(60).unwrap());
        time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(metronome.is_running());
        assert_eq!(metronome.beats(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_beats() {
        let (count, pulse) = counting();
        let mut metronome = Metronome::new(pulse);

        metronome.start(Tempo::new(120).unwrap());
        time::sleep(Duration::from_millis(1200)).await;
        metronome.stop();
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!metronome.is_running());
        assert_eq!(metronome.tempo(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_uses_new_interval() {
        let (count, pulse) = counting();
        let mut metronome = Metronome::new(pulse);

        metronome.start(Tempo::new(30).unwrap());
        time::sleep(Duration::from_millis(1000)).await;
        metronome.start(Tempo::new(120).unwrap());
        time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(metronome.tempo(), Some(Tempo::new(120).unwrap()));
    }
}
