use serde::{Deserialize, Serialize};

/// What sounds during one melody slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notes {
    Rest,
    Single(String),
    /// Always at least two distinct note names.
    Chord(Vec<String>),
}

impl Notes {
    /// Builds the right variant for a list of simultaneous names, deduplicating in order.
    /// Returns `Rest` for an empty list.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names.into_iter().map(Into::into) {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }

        match unique.len() {
            0 => Notes::Rest,
            1 => Notes::Single(unique.remove(0)),
            _ => Notes::Chord(unique),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Notes::Rest)
    }

    pub fn names(&self) -> &[String] {
        match self {
            Notes::Rest => &[],
            Notes::Single(name) => std::slice::from_ref(name),
            Notes::Chord(names) => names,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "ItemIn", into = "ItemOut")]
pub struct MelodyItem {
    pub notes: Notes,
    pub duration_ms: u32,
}

impl MelodyItem {
    pub fn rest(duration_ms: u32) -> Self {
        Self {
            notes: Notes::Rest,
            duration_ms,
        }
    }

    pub fn single(name: impl Into<String>, duration_ms: u32) -> Self {
        Self {
            notes: Notes::Single(name.into()),
            duration_ms,
        }
    }

    pub fn chord<I, S>(names: I, duration_ms: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            notes: Notes::from_names(names),
            duration_ms,
        }
    }
}

pub type Melody = Vec<MelodyItem>;

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum NoteField {
    One(String),
    Many(Vec<String>),
}

/// Wire shape: `{ "note": null | "C4" | ["C4", "E4"], "duration": 400 }`.
#[derive(Serialize)]
struct ItemOut {
    note: Option<NoteField>,
    duration: u32,
}

/// Hand-written files may carry fractional durations.
#[derive(Deserialize)]
struct ItemIn {
    note: Option<NoteField>,
    duration: f64,
}

impl TryFrom<ItemIn> for MelodyItem {
    type Error = String;

    fn try_from(repr: ItemIn) -> Result<Self, Self::Error> {
        let rounded = repr.duration.round();
        if !rounded.is_finite() || rounded < 1.0 || rounded > u32::MAX as f64 {
            return Err(format!("invalid duration {}", repr.duration));
        }

        let notes = match repr.note {
            None => Notes::Rest,
            Some(NoteField::One(name)) => Notes::Single(name),
            Some(NoteField::Many(names)) => {
                if names.is_empty() {
                    return Err("chord with no notes".to_string());
                }
                Notes::from_names(names)
            }
        };

        Ok(MelodyItem {
            notes,
            duration_ms: rounded as u32,
        })
    }
}

impl From<MelodyItem> for ItemOut {
    fn from(item: MelodyItem) -> Self {
        let note = match item.notes {
            Notes::Rest => None,
            Notes::Single(name) => Some(NoteField::One(name)),
            Notes::Chord(names) => Some(NoteField::Many(names)),
        };

        ItemOut {
            note,
            duration: item.duration_ms,
        }
    }
}
