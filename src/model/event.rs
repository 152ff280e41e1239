use crate::model::note::midi_to_name;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
}

/// A single timestamped key press or release, as captured while recording.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub note_name: String,
    pub midi: u8,
    /// Only meaningful for `NoteOn`; zero on releases.
    pub velocity: u8,
    /// Milliseconds since the recording started.
    pub time_ms: f64,
}

impl RawEvent {
    pub fn note_on(midi: u8, velocity: u8, time_ms: f64) -> Option<Self> {
        Some(Self {
            kind: EventKind::NoteOn,
            note_name: midi_to_name(midi)?,
            midi,
            velocity,
            time_ms,
        })
    }

    pub fn note_off(midi: u8, time_ms: f64) -> Option<Self> {
        Some(Self {
            kind: EventKind::NoteOff,
            note_name: midi_to_name(midi)?,
            midi,
            velocity: 0,
            time_ms,
        })
    }

    pub fn is_note_on(&self) -> bool {
        self.kind == EventKind::NoteOn
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub tempo_bpm: Option<f64>,
}

/// Every raw event of an imported take, ready to be compiled.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Performance {
    pub metadata: Metadata,
    pub events: Vec<RawEvent>,
}
