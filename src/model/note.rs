use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    #[error("Unknown pitch class in note '{0}'..!")]
    UnknownPitchClass(String),

    #[error("Missing or invalid octave in note '{0}'..!")]
    InvalidOctave(String),

    #[error("Note '{0}' is outside the MIDI range 0..=127..!")]
    OutOfRange(String),
}

/// One of the twelve semitones of an octave, independent of register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PitchClass(u8);

impl PitchClass {
    pub fn from_value(value: u8) -> Self {
        Self(value % 12)
    }

    /// Semitones above C, 0..=11.
    pub fn value(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        PITCH_CLASS_NAMES[self.0 as usize]
    }

    /// Ascending distance from `root` to `self`, wrapping at the octave.
    pub fn interval_from(self, root: PitchClass) -> u8 {
        (self.0 + 12 - root.0) % 12
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(semitone_offset(s)?.rem_euclid(12) as u8))
    }
}

/// Semitones above C for a spelled pitch class, before octave wrapping ("Cb" -> -1, "B#" -> 12).
fn semitone_offset(s: &str) -> Result<i8, NoteError> {
    let mut chars = s.chars();
    let letter = chars
        .next()
        .ok_or_else(|| NoteError::UnknownPitchClass(s.to_string()))?;

    let natural: i8 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(NoteError::UnknownPitchClass(s.to_string())),
    };

    let accidental: i8 = match chars.as_str() {
        "" => 0,
        "#" => 1,
        "b" => -1,
        _ => return Err(NoteError::UnknownPitchClass(s.to_string())),
    };

    Ok(natural + accidental)
}

/// Splits "C#4" into ("C#", "4"). The octave part keeps a leading minus sign.
pub fn split_note_name(name: &str) -> (&str, &str) {
    let idx = name
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .unwrap_or(name.len());
    name.split_at(idx)
}

/// Strips the octave from a note name, leaving the pitch class text.
pub fn strip_octave(name: &str) -> &str {
    split_note_name(name).0
}

pub fn pitch_class_of(name: &str) -> Result<PitchClass, NoteError> {
    strip_octave(name).parse()
}

/// Canonical name for a MIDI key number, e.g. 60 -> "C4", 0 -> "C-1".
pub fn midi_to_name(midi: u8) -> Option<String> {
    if midi > 127 {
        return None;
    }

    let octave = (midi / 12) as i32 - 1;
    Some(format!("{}{}", PITCH_CLASS_NAMES[(midi % 12) as usize], octave))
}

/// Parses a note name with octave back to its MIDI key number.
pub fn name_to_midi(name: &str) -> Result<u8, NoteError> {
    let (class, octave) = split_note_name(name);
    let offset = semitone_offset(class).map_err(|_| NoteError::UnknownPitchClass(name.to_string()))?;
    let octave: i32 = octave
        .parse()
        .map_err(|_| NoteError::InvalidOctave(name.to_string()))?;

    let midi = (octave + 1) * 12 + offset as i32;
    if !(0..=127).contains(&midi) {
        return Err(NoteError::OutOfRange(name.to_string()));
    }

    Ok(midi as u8)
}

/// Rewrites any accepted spelling ("Db4", "c#4") into the canonical sharp form.
pub fn canonical_name(name: &str) -> Result<String, NoteError> {
    let midi = name_to_midi(name)?;
    midi_to_name(midi).ok_or_else(|| NoteError::OutOfRange(name.to_string()))
}

/// Equal-tempered frequency in Hz with A4 = 440.
pub fn midi_frequency(midi: u8) -> f64 {
    440.0 * 2f64.powf((midi as f64 - 69.0) / 12.0)
}

pub fn note_frequency(name: &str) -> Option<f64> {
    name_to_midi(name).ok().map(midi_frequency)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn midi_names() {
        assert_eq!(midi_to_name(60).as_deref(), Some("C4"));
        assert_eq!(midi_to_name(61).as_deref(), Some("C#4"));
        assert_eq!(midi_to_name(69).as_deref(), Some("A4"));
        assert_eq!(midi_to_name(0).as_deref(), Some("C-1"));
        assert_eq!(midi_to_name(127).as_deref(), Some("G9"));
        assert_eq!(midi_to_name(128), None);
    }

    #[test]
    fn parse_names() {
        assert_eq!(name_to_midi("C4"), Ok(60));
        assert_eq!(name_to_midi("Db4"), Ok(61));
        assert_eq!(name_to_midi("C-1"), Ok(0));
        assert_eq!(name_to_midi("B#3"), Ok(60));
        assert_eq!(name_to_midi("Cb4"), Ok(59));
        assert_eq!(canonical_name("Bb3").as_deref(), Ok("A#3"));

        assert!(matches!(name_to_midi("H4"), Err(NoteError::UnknownPitchClass(_))));
        assert!(matches!(name_to_midi("C"), Err(NoteError::InvalidOctave(_))));
        assert!(matches!(name_to_midi("G9000"), Err(NoteError::OutOfRange(_))));
    }

    #[test]
    fn pitch_class_intervals() {
        let c: PitchClass = "C".parse().unwrap();
        let e: PitchClass = "E".parse().unwrap();
        let a: PitchClass = "A".parse().unwrap();

        assert_eq!(e.interval_from(c), 4);
        assert_eq!(c.interval_from(a), 3);
        assert_eq!(pitch_class_of("F#5").unwrap().name(), "F#");
        assert_eq!(strip_octave("A#-1"), "A#");
    }

    #[test]
    fn frequencies() {
        assert!((midi_frequency(69) - 440.0).abs() < 1e-9);
        assert!((note_frequency("C4").unwrap() - 261.63).abs() < 0.01);
        assert!((note_frequency("C7").unwrap() - 2093.0).abs() < 0.01);
        assert_eq!(note_frequency("nope"), None);
    }
}
