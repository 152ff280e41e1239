use crate::engine::{LIVE_RELEASE_S, LIVE_RETRIGGER_S, ToneEngine, ToneEnvelope};
use crate::model::config::PlaybackConfig;
use crate::model::melody::MelodyItem;
use crate::util::check_speed;
use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use crate::model::note::note_frequency;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Default)]
struct Mix {
    /// Wall-clock time of the first real-time tone.
    origin: Option<Instant>,
    samples: Vec<f32>,
    /// Live keys still down: onset in seconds, frequency and velocity.
    held: HashMap<u8, (f64, f64, u8)>,
}

/// Mixes tones into a mono buffer that can be written out as a WAV file.
///
/// Used as a [`ToneEngine`], each tone lands at its wall-clock offset from the first one.
/// [`render_melody`] fills it on a virtual clock instead.
#[derive(Debug)]
pub struct WavEngine {
    sample_rate: u32,
    mix: Mutex<Mix>,
}

impl WavEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            mix: Mutex::new(Mix::default()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mixes a tone starting `offset_s` seconds into the buffer.
    pub fn add_tone_at(&self, offset_s: f64, envelope: &ToneEnvelope) -> Result<()> {
        let Ok(mut mix) = self.mix.lock() else {
            bail!("Failed to lock the mix buffer..!");
        };

        let rate = self.sample_rate as f64;
        let start = (offset_s.max(0.0) * rate).round() as usize;
        let len = (envelope.length_s * rate).ceil() as usize;

        if mix.samples.len() < start + len {
            mix.samples.resize(start + len, 0.0);
        }

        for (i, sample) in mix.samples[start..start + len].iter_mut().enumerate() {
            *sample += envelope.sample_at(i as f64 / rate) as f32;
        }

        Ok(())
    }

    /// Presses a live key `offset_s` seconds into the buffer. A key that is still down is cut
    /// with a short fade first.
    pub fn key_down_at(&self, offset_s: f64, midi: u8, frequency: f64, velocity: u8) -> Result<()> {
        let retriggered = {
            let Ok(mut mix) = self.mix.lock() else {
                bail!("Failed to lock the mix buffer..!");
            };
            mix.held.insert(midi, (offset_s, frequency, velocity))
        };

        if let Some((onset_s, frequency, velocity)) = retriggered {
            debug!("MIDI {} struck again while sounding..!", midi);
            let envelope =
                ToneEnvelope::sustained(frequency, velocity, offset_s - onset_s, LIVE_RETRIGGER_S);
            self.add_tone_at(onset_s, &envelope)?;
        }

        Ok(())
    }

    /// Releases a live key `offset_s` seconds into the buffer, mixing it in with its release fade.
    pub fn key_up_at(&self, offset_s: f64, midi: u8) -> Result<()> {
        let released = {
            let Ok(mut mix) = self.mix.lock() else {
                bail!("Failed to lock the mix buffer..!");
            };
            mix.held.remove(&midi)
        };

        if let Some((onset_s, frequency, velocity)) = released {
            let envelope =
                ToneEnvelope::sustained(frequency, velocity, offset_s - onset_s, LIVE_RELEASE_S);
            self.add_tone_at(onset_s, &envelope)?;
        }

        Ok(())
    }

    /// Seconds since the first real-time tone, starting the clock if needed.
    fn now_s(&self) -> Result<f64> {
        let Ok(mut mix) = self.mix.lock() else {
            bail!("Failed to lock the mix buffer..!");
        };
        Ok(mix.origin.get_or_insert_with(Instant::now).elapsed().as_secs_f64())
    }

    /// Extends the buffer with silence so it lasts at least `seconds`.
    pub fn pad_to(&self, seconds: f64) -> Result<()> {
        let Ok(mut mix) = self.mix.lock() else {
            bail!("Failed to lock the mix buffer..!");
        };

        let len = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        if mix.samples.len() < len {
            mix.samples.resize(len, 0.0);
        }

        Ok(())
    }

    pub fn samples(&self) -> Result<Vec<f32>> {
        let Ok(mix) = self.mix.lock() else {
            bail!("Failed to lock the mix buffer..!");
        };
        Ok(mix.samples.clone())
    }

    pub fn duration_s(&self) -> Result<f64> {
        let Ok(mix) = self.mix.lock() else {
            bail!("Failed to lock the mix buffer..!");
        };
        Ok(mix.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Writes the buffer as a mono 32-bit float WAV, clipping to [-1, 1].
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let samples = self.samples()?;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec).map_err(|e| {
            anyhow!(
                "Failed to create WAV file {}: {}",
                path.as_ref().display(),
                e
            )
        })?;

        for sample in samples.iter() {
            writer.write_sample(sample.clamp(-1.0, 1.0))?;
        }
        writer.finalize()?;

        info!(
            "Wrote {:.2}s of audio to {}..!",
            samples.len() as f64 / self.sample_rate as f64,
            path.as_ref().display()
        );

        Ok(())
    }
}

impl Default for WavEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl ToneEngine for WavEngine {
    fn play_tone(&self, note: &str, duration_ms: f64, speed: f64) -> Result<()> {
        let Some(envelope) = ToneEnvelope::for_note(note, duration_ms, speed) else {
            debug!("No frequency for note '{}', skipping tone..!", note);
            return Ok(());
        };

        let offset_s = self.now_s()?;
        self.add_tone_at(offset_s, &envelope)
    }

    fn note_on(&self, midi: u8, note: &str, velocity: u8) -> Result<()> {
        let Some(frequency) = note_frequency(note) else {
            debug!("No frequency for note '{}', skipping live tone..!", note);
            return Ok(());
        };

        let offset_s = self.now_s()?;
        self.key_down_at(offset_s, midi, frequency, velocity)
    }

    fn note_off(&self, midi: u8) -> Result<()> {
        let offset_s = self.now_s()?;
        self.key_up_at(offset_s, midi)
    }

    /// Truncates everything mixed past the current moment. Keys still down are dropped.
    fn silence(&self) -> Result<()> {
        let Ok(mut mix) = self.mix.lock() else {
            bail!("Failed to lock the mix buffer..!");
        };

        mix.held.clear();
        if let Some(origin) = mix.origin {
            let now = (origin.elapsed().as_secs_f64() * self.sample_rate as f64) as usize;
            mix.samples.truncate(now);
        }

        Ok(())
    }
}

/// Renders `melody` offline with the player's timing: every item starts after the previous
/// item's duration plus the note gap, both divided by the speed.
pub fn render_melody(
    melody: &[MelodyItem],
    playback: &PlaybackConfig,
    sample_rate: u32,
) -> Result<WavEngine> {
    let speed = check_speed(playback.speed)?;
    let engine = WavEngine::new(sample_rate);
    let mut cursor_s = 0.0;

    for item in melody.iter() {
        for note in item.notes.names() {
            match ToneEnvelope::for_note(note, item.duration_ms as f64, speed) {
                Some(envelope) => engine.add_tone_at(cursor_s, &envelope)?,
                None => debug!("No frequency for note '{}', skipping tone..!", note),
            }
        }

        cursor_s += (item.duration_ms as f64 + playback.note_gap_ms) / 1000.0 / speed;
    }

    engine.pad_to(cursor_s)?;
    debug!(
        "Rendered {} item(s) into {:.3}s of audio..!",
        melody.len(),
        cursor_s
    );

    Ok(engine)
}

#[cfg(test)]
mod test {
    use super::*;

    const RATE: u32 = 8_000;

    #[test]
    fn render_timeline() {
        env_logger::try_init().unwrap_or(());

        let melody = vec![
            MelodyItem::single("A4", 500),
            MelodyItem::rest(250),
            MelodyItem::chord(["C4", "E4", "G4"], 200),
        ];

        let engine = render_melody(&melody, &PlaybackConfig::default(), RATE).unwrap();
        let samples = engine.samples().unwrap();

        // (500 + 50) + (250 + 50) + (200 + 50) ms.
        assert_eq!(samples.len(), 8_800);

        // 450ms of A4, silence until the chord at 850ms, then 180ms of chord and padding.
        assert!(samples[..3_600].iter().any(|s| s.abs() > 0.1));
        assert!(samples[3_601..6_800].iter().all(|s| *s == 0.0));
        assert!(samples[6_800..7_000].iter().any(|s| s.abs() > 0.1));
        assert!(samples[8_300..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn speed_compresses_timeline() {
        let melody = vec![MelodyItem::single("A4", 950)];
        let playback = PlaybackConfig {
            speed: 2.0,
            ..PlaybackConfig::default()
        };

        let engine = render_melody(&melody, &playback, RATE).unwrap();
        assert!((engine.duration_s().unwrap() - 0.5).abs() < 1e-9);

        let bad = PlaybackConfig {
            speed: 0.0,
            ..PlaybackConfig::default()
        };
        assert!(render_melody(&melody, &bad, RATE).is_err());
    }

    #[test]
    fn unknown_notes_are_silent() {
        env_logger::try_init().unwrap_or(());

        let melody = vec![MelodyItem::single("Q4", 100)];
        let engine = render_melody(&melody, &PlaybackConfig::default(), RATE).unwrap();
        assert!(engine.samples().unwrap().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn live_keys_sustain_until_release() {
        env_logger::try_init().unwrap_or(());

        let engine = WavEngine::new(RATE);
        engine.key_down_at(0.0, 69, 440.0, 127).unwrap();
        // Nothing is mixed while the key is down.
        assert!(engine.samples().unwrap().is_empty());

        engine.key_up_at(0.5, 69).unwrap();
        let samples = engine.samples().unwrap();
        // Half a second held plus the release fade.
        assert!(samples.len().abs_diff(4_800) <= 1);
        assert!(samples[..4_000].iter().any(|s| s.abs() > 0.5));
        assert!(samples.iter().all(|s| s.abs() <= 0.7 + 1e-6));

        // Releasing a key that is not down mixes nothing.
        engine.key_up_at(1.0, 69).unwrap();
        assert_eq!(engine.samples().unwrap().len(), samples.len());
    }

    #[test]
    fn retrigger_cuts_the_sounding_key() {
        let engine = WavEngine::new(RATE);
        engine.key_down_at(0.0, 60, 261.63, 64).unwrap();
        engine.key_down_at(0.25, 60, 261.63, 64).unwrap();

        // The first strike ends with a short fade at the second.
        assert!(engine.samples().unwrap().len().abs_diff(2_080) <= 1);

        engine.key_up_at(0.5, 60).unwrap();
        assert!(engine.samples().unwrap().len().abs_diff(4_800) <= 1);
    }

    #[test]
    fn silence_forgets_held_keys() {
        let engine = WavEngine::new(RATE);
        engine.key_down_at(0.0, 60, 261.63, 100).unwrap();
        engine.silence().unwrap();
        engine.key_up_at(0.5, 60).unwrap();
        assert!(engine.samples().unwrap().is_empty());
    }

    #[test]
    fn writes_float_wav() {
        env_logger::try_init().unwrap_or(());

        let melody = vec![MelodyItem::single("C5", 300)];
        let engine = render_melody(&melody, &PlaybackConfig::default(), RATE).unwrap();

        let path = std::env::temp_dir().join("piano_scribe_render_test.wav");
        engine.write_wav(&path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, RATE);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), engine.samples().unwrap().len());
        assert!(samples.iter().all(|s| s.abs() <= 1.0));

        std::fs::remove_file(&path).unwrap_or(());
    }
}
