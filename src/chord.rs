use crate::model::note::{PitchClass, pitch_class_of};
use log::debug;

/// Interval sets (semitones above the root, ascending) and the quality they name.
pub const CHORD_LIBRARY: &[(&[u8], &str)] = &[
    // Triads
    (&[0, 4, 7], "Maj"),
    (&[0, 3, 7], "Min"),
    (&[0, 3, 6], "Dim"),
    (&[0, 4, 8], "Aug"),
    (&[0, 5, 7], "Sus4"),
    (&[0, 2, 7], "Sus2"),
    // Sevenths and sixths
    (&[0, 4, 7, 10], "7"),
    (&[0, 4, 7, 11], "Maj7"),
    (&[0, 3, 7, 10], "Min7"),
    (&[0, 3, 6, 10], "Min7b5"),
    (&[0, 3, 6, 9], "Dim7"),
    (&[0, 4, 7, 9], "6"),
    (&[0, 3, 7, 9], "Min6"),
    // Ninths, with the 9th folded into the octave (14 -> 2)
    (&[0, 2, 4, 7, 10], "9"),
    (&[0, 2, 4, 7, 11], "Maj9"),
    (&[0, 2, 3, 7, 10], "Min9"),
];

/// Exact lookup of a sorted interval set in [`CHORD_LIBRARY`].
pub fn quality_for_intervals(intervals: &[u8]) -> Option<&'static str> {
    CHORD_LIBRARY
        .iter()
        .find(|(pattern, _)| *pattern == intervals)
        .map(|(_, quality)| *quality)
}

/// Distinct pitch classes of `notes`, lowest first. Names that don't parse are skipped.
pub fn pitch_classes<S: AsRef<str>>(notes: &[S]) -> Vec<PitchClass> {
    let mut classes: Vec<PitchClass> = notes
        .iter()
        .filter_map(|note| match pitch_class_of(note.as_ref()) {
            Ok(class) => Some(class),
            Err(why) => {
                debug!("Ignoring note while naming chord: {}", why);
                None
            }
        })
        .collect();

    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Sorted intervals of every class above `root`, root included as 0.
fn intervals_from(root: PitchClass, classes: &[PitchClass]) -> Vec<u8> {
    let mut intervals: Vec<u8> = classes.iter().map(|c| c.interval_from(root)).collect();
    intervals.sort_unstable();
    intervals
}

/// Names the chord formed by `notes`.
///
/// A single note is returned untouched. Otherwise every pitch class is tried as the root,
/// lowest first, so inversions such as E-G-C still resolve to "C Maj". When nothing in the
/// library matches, the result is a generic "<lowest> Chord (<count>)" label.
///
/// An empty slice is a caller error and yields an empty label.
pub fn identify_chord<S: AsRef<str>>(notes: &[S]) -> String {
    match notes {
        [] => return String::new(),
        [single] => return single.as_ref().to_string(),
        _ => {}
    }

    let classes = pitch_classes(notes);
    let Some(&lowest) = classes.first() else {
        return String::new();
    };

    if classes.len() > 1 {
        for &root in classes.iter() {
            let intervals = intervals_from(root, &classes);
            if let Some(quality) = quality_for_intervals(&intervals) {
                return format!("{} {}", root, quality);
            }
        }
    }

    format!("{} Chord ({})", lowest, classes.len())
}
