use crate::chord::identify_chord;
use crate::compiler::{Compilation, compile_events};
use crate::engine::ToneEngine;
use crate::model::config::CompilerConfig;
use crate::model::event::{EventKind, RawEvent};
use anyhow::{Result, anyhow, bail};
use log::{debug, info, warn};
use midly::MidiMessage;
use midly::live::LiveEvent;
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Decodes a raw MIDI message into a key press or release, ignoring every other message.
/// A NoteOn with velocity 0 is a release.
pub fn decode_message(bytes: &[u8], time_ms: f64) -> Result<Option<RawEvent>> {
    let event = LiveEvent::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI message: {:?}", e))?;

    let LiveEvent::Midi { message, .. } = event else {
        return Ok(None);
    };

    let decoded = match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
            RawEvent::note_on(key.as_int(), vel.as_int(), time_ms)
        }
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            RawEvent::note_off(key.as_int(), time_ms)
        }
        _ => None,
    };

    Ok(decoded)
}

/// Everything captured between pressing record and pressing stop.
#[derive(Debug, Default)]
pub struct RecordingSession {
    recording: bool,
    started_at: Option<Instant>,
    events: Vec<RawEvent>,
    held: BTreeMap<u8, String>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    /// Clears the buffer and starts the session clock.
    pub fn start(&mut self) -> Result<()> {
        if self.recording {
            bail!("Recording already in progress..!");
        }

        self.events.clear();
        self.started_at = Some(Instant::now());
        self.recording = true;
        info!("Recording started..!");

        Ok(())
    }

    /// Stops recording and hands over the captured events. Nothing can be appended afterwards.
    pub fn stop(&mut self) -> Result<Vec<RawEvent>> {
        if !self.recording {
            bail!("Not recording..!");
        }

        self.recording = false;
        self.started_at = None;
        let events = mem::take(&mut self.events);
        info!("Recording stopped with {} raw event(s)..!", events.len());

        Ok(events)
    }

    /// Drops everything, including the held-key state used by the live display.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Milliseconds elapsed on the session clock, if recording.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.started_at.map(|t| t.elapsed().as_secs_f64() * 1000.0)
    }

    /// Updates the held keys and, while recording, appends the event to the buffer.
    pub fn push(&mut self, event: RawEvent) {
        match event.kind {
            EventKind::NoteOn => {
                self.held.insert(event.midi, event.note_name.clone());
            }
            EventKind::NoteOff => {
                self.held.remove(&event.midi);
            }
        }

        if self.recording {
            self.events.push(event);
        }
    }

    /// Feeds a raw MIDI message stamped at `time_ms` through the session.
    pub fn handle_message(&mut self, bytes: &[u8], time_ms: f64) -> Result<Option<RawEvent>> {
        let decoded = decode_message(bytes, time_ms)?;

        if let Some(event) = decoded.as_ref() {
            debug!(
                "{:?} {} (midi={}, vel={}) at {:.3}ms",
                event.kind, event.note_name, event.midi, event.velocity, event.time_ms
            );
            self.push(event.clone());
        }

        Ok(decoded)
    }

    /// Names of the keys currently held down, lowest first.
    pub fn held_notes(&self) -> Vec<String> {
        self.held.values().cloned().collect()
    }

    /// Label for the live-input indicator, or `None` when no key is held.
    pub fn held_chord_label(&self) -> Option<String> {
        let held = self.held_notes();
        if held.is_empty() {
            return None;
        }

        Some(identify_chord(&held))
    }
}

/// A [`RecordingSession`] shared between a device callback and the thread driving the UI.
///
/// With a monitor attached, every decoded key press and release is also sounded, whether or
/// not a recording is in progress.
#[derive(Default)]
pub struct Recorder {
    session: Mutex<RecordingSession>,
    monitor: Option<Arc<dyn ToneEngine>>,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("session", &self.session)
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that sounds live input through `engine`.
    pub fn with_monitor(engine: Arc<dyn ToneEngine>) -> Self {
        Self {
            monitor: Some(engine),
            ..Self::default()
        }
    }

    pub fn start(&self) -> Result<()> {
        let Ok(mut session) = self.session.lock() else {
            bail!("Failed to lock the recording session..!");
        };
        session.start()
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().map(|s| s.is_recording()).unwrap_or(false)
    }

    /// Device callback entry point, stamps the message with the session clock.
    pub fn handle_message(&self, bytes: &[u8]) -> Result<Option<RawEvent>> {
        let decoded = {
            let Ok(mut session) = self.session.lock() else {
                bail!("Failed to lock the recording session..!");
            };

            let time_ms = session.elapsed_ms().unwrap_or(0.0);
            session.handle_message(bytes, time_ms)?
        };

        if let (Some(monitor), Some(event)) = (self.monitor.as_ref(), decoded.as_ref()) {
            let sounded = match event.kind {
                EventKind::NoteOn => monitor.note_on(event.midi, &event.note_name, event.velocity),
                EventKind::NoteOff => monitor.note_off(event.midi),
            };

            // A failing engine must not cost the recording its events.
            if let Err(why) = sounded {
                warn!("Failed to sound MIDI {}: {}..!", event.midi, why);
            }
        }

        Ok(decoded)
    }

    pub fn held_chord_label(&self) -> Option<String> {
        self.session.lock().ok()?.held_chord_label()
    }

    /// Stops recording and compiles the frozen buffer.
    ///
    /// The session is flagged as stopped and its buffer taken under the lock, so messages
    /// arriving during compilation are no longer recorded.
    pub fn stop_and_compile(&self, config: &CompilerConfig) -> Result<Compilation> {
        config.validate()?;

        let events = {
            let Ok(mut session) = self.session.lock() else {
                bail!("Failed to lock the recording session..!");
            };
            session.stop()?
        };

        let compilation = compile_events(&events, config);
        if compilation.melody.is_empty() {
            warn!("Recording was empty or contained no valid notes..!");
        }

        Ok(compilation)
    }

    pub fn reset(&self) -> Result<()> {
        let Ok(mut session) = self.session.lock() else {
            bail!("Failed to lock the recording session..!");
        };
        session.reset();
        Ok(())
    }
}
