use crate::engine::{ToneEngine, ToneEnvelope, live_gain};
use anyhow::bail;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Logs every tone instead of sounding it. Useful on machines without an audio device.
#[derive(Debug, Default)]
pub struct ConsoleEngine {
    tones: AtomicUsize,
    /// Live keys currently sounding, by MIDI number.
    sounding: Mutex<BTreeMap<u8, String>>,
}

impl ConsoleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tones started so far, live keys included.
    pub fn tones_played(&self) -> usize {
        self.tones.load(Ordering::Relaxed)
    }

    /// Names of the live keys still sounding, lowest first.
    pub fn sounding_notes(&self) -> Vec<String> {
        self.sounding
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl ToneEngine for ConsoleEngine {
    fn play_tone(&self, note: &str, duration_ms: f64, speed: f64) -> anyhow::Result<()> {
        let Some(envelope) = ToneEnvelope::for_note(note, duration_ms, speed) else {
            debug!("No frequency for note '{}', skipping tone..!", note);
            return Ok(());
        };

        self.tones.fetch_add(1, Ordering::Relaxed);
        info!(
            "~ {:<4} {:>8.2}Hz | sounding {:>7.1}ms | fade {:>5.1}ms",
            note,
            envelope.frequency,
            envelope.length_s * 1000.0,
            envelope.fade_s * 1000.0
        );

        Ok(())
    }

    fn note_on(&self, midi: u8, note: &str, velocity: u8) -> anyhow::Result<()> {
        let Some(frequency) = ToneEnvelope::for_note(note, 0.0, 1.0).map(|e| e.frequency) else {
            debug!("No frequency for note '{}', skipping live tone..!", note);
            return Ok(());
        };

        let Ok(mut sounding) = self.sounding.lock() else {
            bail!("Failed to lock the sounding keys..!");
        };

        if sounding.insert(midi, note.to_string()).is_some() {
            debug!("Restarting {} while it still sounds..!", note);
        }
        self.tones.fetch_add(1, Ordering::Relaxed);
        info!(
            "+ {:<4} {:>8.2}Hz | gain {:.3}",
            note,
            frequency,
            live_gain(velocity)
        );

        Ok(())
    }

    fn note_off(&self, midi: u8) -> anyhow::Result<()> {
        let Ok(mut sounding) = self.sounding.lock() else {
            bail!("Failed to lock the sounding keys..!");
        };

        if let Some(note) = sounding.remove(&midi) {
            info!("- {:<4} released", note);
        }

        Ok(())
    }

    fn silence(&self) -> anyhow::Result<()> {
        let Ok(mut sounding) = self.sounding.lock() else {
            bail!("Failed to lock the sounding keys..!");
        };

        sounding.clear();
        info!("~ silence..!");
        Ok(())
    }
}
