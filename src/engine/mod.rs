use crate::model::melody::MelodyItem;
use crate::model::note::note_frequency;
use log::debug;

pub mod console;
pub mod wav;

/// Peak amplitude of every scripted tone.
pub const TONE_GAIN: f64 = 0.5;

/// Tones stop this far into their slot, leaving a short gap before the next one.
pub const SUSTAIN_FRACTION: f64 = 0.9;

/// Longest fade-out at normal speed, in seconds.
pub const MAX_FADE_S: f64 = 0.05;

/// Loudest a live key can sound, reached at velocity 127.
pub const LIVE_MAX_GAIN: f64 = 0.7;

/// Fade after a live key is released, in seconds.
pub const LIVE_RELEASE_S: f64 = 0.1;

/// Fade when a live key is struck again while still sounding, in seconds.
pub const LIVE_RETRIGGER_S: f64 = 0.01;

/// How long a previewed item sounds.
pub const PREVIEW_DURATION_MS: f64 = 400.0;

/// Sounds notes on behalf of the [`Player`](crate::player::Player).
pub trait ToneEngine: Send + Sync {
    /// Start a tone for `note` lasting `duration_ms / speed`. Must not block for the tone's duration.
    fn play_tone(&self, note: &str, duration_ms: f64, speed: f64) -> anyhow::Result<()>;

    /// Start a live tone for a pressed key, sustained until [`note_off`](Self::note_off).
    /// Pressing a key that is already sounding restarts it.
    fn note_on(&self, midi: u8, note: &str, velocity: u8) -> anyhow::Result<()>;

    /// Release a live tone. Keys that are not sounding are ignored.
    fn note_off(&self, midi: u8) -> anyhow::Result<()>;

    /// Cut every tone that is still sounding.
    fn silence(&self) -> anyhow::Result<()>;
}

/// Gain of a live key: proportional to velocity, capped at [`LIVE_MAX_GAIN`].
pub fn live_gain(velocity: u8) -> f64 {
    (velocity as f64 / 127.0 * LIVE_MAX_GAIN).min(LIVE_MAX_GAIN)
}

/// Sounds every note of `item` for [`PREVIEW_DURATION_MS`] at normal speed. Rests are silent.
/// Returns how many tones were started.
pub fn preview<E: ToneEngine + ?Sized>(engine: &E, item: &MelodyItem) -> anyhow::Result<usize> {
    let names = item.notes.names();
    if names.is_empty() {
        debug!("Nothing to preview for a rest..!");
    }

    for note in names {
        engine.play_tone(note, PREVIEW_DURATION_MS, 1.0)?;
    }

    Ok(names.len())
}

/// When a tone sounds and how loud, relative to its onset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEnvelope {
    pub frequency: f64,
    /// Level before the fade.
    pub gain: f64,
    /// Seconds from onset until the tone stops.
    pub length_s: f64,
    /// Seconds of linear fade ending at `length_s`.
    pub fade_s: f64,
}

impl ToneEnvelope {
    pub fn new(frequency: f64, duration_ms: f64, speed: f64) -> Self {
        let duration_s = duration_ms.max(0.0) / 1000.0 / speed;

        Self {
            frequency,
            gain: TONE_GAIN,
            length_s: duration_s * SUSTAIN_FRACTION,
            fade_s: (duration_s * 0.1).min(MAX_FADE_S / speed),
        }
    }

    /// A live key held for `held_s` seconds, followed by a release fade of `release_s`.
    pub fn sustained(frequency: f64, velocity: u8, held_s: f64, release_s: f64) -> Self {
        Self {
            frequency,
            gain: live_gain(velocity),
            length_s: held_s.max(0.0) + release_s,
            fade_s: release_s,
        }
    }

    /// `None` for names outside the tuning table.
    pub fn for_note(note: &str, duration_ms: f64, speed: f64) -> Option<Self> {
        note_frequency(note).map(|frequency| Self::new(frequency, duration_ms, speed))
    }

    /// Gain at `t` seconds after onset.
    pub fn gain_at(&self, t: f64) -> f64 {
        if t < 0.0 || t >= self.length_s {
            return 0.0;
        }

        let fade_start = (self.length_s - self.fade_s).max(0.0);
        if t <= fade_start || self.fade_s <= 0.0 {
            self.gain
        } else {
            self.gain * (self.length_s - t) / self.fade_s
        }
    }

    /// Signal value at `t` seconds after onset.
    pub fn sample_at(&self, t: f64) -> f64 {
        self.gain_at(t) * triangle(self.frequency, t)
    }
}

/// Unit triangle wave, -1 at phase 0 and +1 half a period later.
pub fn triangle(frequency: f64, t: f64) -> f64 {
    let phase = (frequency * t).fract();
    1.0 - 4.0 * (phase - 0.5).abs()
}

/// A [`ToneEngine`] that remembers what it was asked to do.
#[cfg(test)]
pub(crate) mod testing {
    use super::ToneEngine;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Tone {
        pub note: String,
        pub duration_ms: f64,
        pub speed: f64,
        pub at: Instant,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Live {
        On(u8, String, u8),
        Off(u8),
    }

    #[derive(Debug, Default)]
    pub struct RecordingEngine {
        tones: Mutex<Vec<Tone>>,
        live: Mutex<Vec<Live>>,
        silenced: AtomicBool,
    }

    impl RecordingEngine {
        pub fn tones(&self) -> Vec<Tone> {
            self.tones.lock().unwrap().clone()
        }

        pub fn live(&self) -> Vec<Live> {
            self.live.lock().unwrap().clone()
        }

        pub fn was_silenced(&self) -> bool {
            self.silenced.load(Ordering::SeqCst)
        }
    }

    impl ToneEngine for RecordingEngine {
        fn play_tone(&self, note: &str, duration_ms: f64, speed: f64) -> anyhow::Result<()> {
            self.tones.lock().unwrap().push(Tone {
                note: note.to_string(),
                duration_ms,
                speed,
                at: Instant::now(),
            });
            Ok(())
        }

        fn note_on(&self, midi: u8, note: &str, velocity: u8) -> anyhow::Result<()> {
            self.live
                .lock()
                .unwrap()
                .push(Live::On(midi, note.to_string(), velocity));
            Ok(())
        }

        fn note_off(&self, midi: u8) -> anyhow::Result<()> {
            self.live.lock().unwrap().push(Live::Off(midi));
            Ok(())
        }

        fn silence(&self) -> anyhow::Result<()> {
            self.silenced.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::testing::RecordingEngine;
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPSILON
    }

    #[test]
    fn envelope_timing() {
        let envelope = ToneEnvelope::new(440.0, 1000.0, 1.0);
        assert!(approx_eq(envelope.length_s, 0.9));
        assert!(approx_eq(envelope.fade_s, 0.05));

        // Short notes fade over a tenth of their slot.
        let short = ToneEnvelope::new(440.0, 200.0, 1.0);
        assert!(approx_eq(short.fade_s, 0.02));

        // Speed scales both.
        let fast = ToneEnvelope::new(440.0, 1000.0, 2.0);
        assert!(approx_eq(fast.length_s, 0.45));
        assert!(approx_eq(fast.fade_s, 0.025));
    }

    #[test]
    fn gain_shape() {
        let envelope = ToneEnvelope::new(440.0, 1000.0, 1.0);
        assert_eq!(envelope.gain_at(-0.1), 0.0);
        assert!(approx_eq(envelope.gain_at(0.0), TONE_GAIN));
        assert!(approx_eq(envelope.gain_at(0.85), TONE_GAIN));
        assert!(approx_eq(envelope.gain_at(0.875), TONE_GAIN / 2.0));
        assert_eq!(envelope.gain_at(0.9), 0.0);
        assert_eq!(envelope.gain_at(2.0), 0.0);
    }

    #[test]
    fn triangle_wave() {
        assert!(approx_eq(triangle(1.0, 0.0), -1.0));
        assert!(approx_eq(triangle(1.0, 0.25), 0.0));
        assert!(approx_eq(triangle(1.0, 0.5), 1.0));
        assert!(approx_eq(triangle(2.0, 0.25), 1.0));
    }

    #[test]
    fn live_envelopes() {
        assert!(approx_eq(live_gain(127), LIVE_MAX_GAIN));
        assert!(approx_eq(live_gain(0), 0.0));
        assert!(approx_eq(live_gain(64), 64.0 / 127.0 * 0.7));

        let held = ToneEnvelope::sustained(440.0, 127, 1.0, LIVE_RELEASE_S);
        assert!(approx_eq(held.length_s, 1.1));
        assert!(approx_eq(held.gain_at(0.5), LIVE_MAX_GAIN));
        assert!(approx_eq(held.gain_at(1.05), LIVE_MAX_GAIN / 2.0));
        assert_eq!(held.gain_at(1.2), 0.0);
    }

    #[test]
    fn preview_plays_every_note_of_an_item() {
        env_logger::try_init().unwrap_or(());

        let engine = RecordingEngine::default();
        assert_eq!(preview(&engine, &MelodyItem::chord(["C4", "E4", "G4"], 1200)).unwrap(), 3);
        assert_eq!(preview(&engine, &MelodyItem::rest(300)).unwrap(), 0);
        assert_eq!(preview(&engine, &MelodyItem::single("A4", 90)).unwrap(), 1);

        let tones = engine.tones();
        let notes: Vec<&str> = tones.iter().map(|t| t.note.as_str()).collect();
        assert_eq!(notes, vec!["C4", "E4", "G4", "A4"]);
        assert!(tones.iter().all(|t| t.duration_ms == PREVIEW_DURATION_MS && t.speed == 1.0));
    }

    #[test]
    fn envelope_for_named_notes() {
        let a4 = ToneEnvelope::for_note("A4", 500.0, 1.0).unwrap();
        assert!(approx_eq(a4.frequency, 440.0));
        assert!(ToneEnvelope::for_note("H9", 500.0, 1.0).is_none());
    }
}
