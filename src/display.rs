use crate::chord::identify_chord;
use crate::export::melody_to_json;
use crate::model::melody::{MelodyItem, Notes};
use anyhow::Result;

pub const REST_LABEL: &str = "—";
pub const EMPTY_SONG: &str = "No song data.";

/// What the note display shows for one item.
pub fn item_label(item: &MelodyItem) -> String {
    match &item.notes {
        Notes::Rest => REST_LABEL.to_string(),
        Notes::Single(name) => name.clone(),
        Notes::Chord(names) => identify_chord(names),
    }
}

/// Every label of the melody on one line.
pub fn scroller_line(melody: &[MelodyItem]) -> String {
    if melody.is_empty() {
        return EMPTY_SONG.to_string();
    }

    melody.iter().map(item_label).collect::<Vec<_>>().join(" ")
}

/// Like [`scroller_line`], with the item at `index` in brackets. Out-of-range indices highlight nothing.
pub fn highlighted_line(melody: &[MelodyItem], index: usize) -> String {
    if melody.is_empty() {
        return EMPTY_SONG.to_string();
    }

    melody
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let label = item_label(item);
            if i == index {
                format!("[{}]", label)
            } else {
                label
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pretty JSON, exactly as it would be exported.
pub fn json_view(melody: &[MelodyItem]) -> Result<String> {
    melody_to_json(melody)
}
