use crate::model::melody::{Melody, MelodyItem};

/// Keys of the bundled melodies, in menu order.
pub const BUILTIN_KEYS: &[&str] = &["twinkle", "mary", "chords", "12BarBluesC"];

fn n(name: &str, duration_ms: u32) -> MelodyItem {
    MelodyItem::single(name, duration_ms)
}

fn r(duration_ms: u32) -> MelodyItem {
    MelodyItem::rest(duration_ms)
}

fn c(names: &[&str], duration_ms: u32) -> MelodyItem {
    MelodyItem::chord(names.iter().copied(), duration_ms)
}

pub fn builtin_melody(key: &str) -> Option<Melody> {
    match key {
        "twinkle" => Some(twinkle()),
        "mary" => Some(mary_had_a_little_lamb()),
        "chords" => Some(chords_example()),
        "12BarBluesC" => Some(twelve_bar_blues_c()),
        _ => None,
    }
}

/// Turns a song key into a menu label: "12BarBluesC" -> "12 Bar Blues C", "twinkle" -> "Twinkle".
pub fn display_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_digit = false;

    for (i, ch) in key.chars().enumerate() {
        let ch = if i == 0 { ch.to_ascii_uppercase() } else { ch };
        let is_digit = ch.is_ascii_digit();

        if i > 0 && (ch.is_ascii_uppercase() || (is_digit && !prev_digit)) {
            out.push(' ');
        }

        out.push(ch);
        prev_digit = is_digit;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[rustfmt::skip]
fn twinkle() -> Melody {
    let phrase_a = [
        n("C4", 400), n("C4", 400), n("G4", 400), n("G4", 400),
        n("A4", 400), n("A4", 400), n("G4", 700), r(100),
        n("F4", 400), n("F4", 400), n("E4", 400), n("E4", 400),
        n("D4", 400), n("D4", 400), n("C4", 700),
    ];
    let phrase_b = [
        n("G4", 400), n("G4", 400), n("F4", 400), n("F4", 400),
        n("E4", 400), n("E4", 400), n("D4", 700),
    ];

    let mut melody = phrase_a.to_vec();
    melody.push(r(300));
    melody.extend_from_slice(&phrase_b);
    melody.push(r(100));
    melody.extend_from_slice(&phrase_b);
    melody.push(r(300));
    melody.extend_from_slice(&phrase_a);
    melody
}

#[rustfmt::skip]
fn mary_had_a_little_lamb() -> Melody {
    vec![
        n("E4", 400), n("D4", 400), n("C4", 400), n("D4", 400),
        n("E4", 400), n("E4", 400), n("E4", 700), r(100),
        n("D4", 400), n("D4", 400), n("D4", 700), r(100),
        n("E4", 400), n("G4", 400), n("G4", 700), r(100),
        n("E4", 400), n("D4", 400), n("C4", 400), n("D4", 400),
        n("E4", 400), n("E4", 400), n("E4", 400), n("E4", 400),
        n("D4", 400), n("D4", 400), n("E4", 400), n("D4", 400),
        n("C4", 900),
    ]
}

#[rustfmt::skip]
fn chords_example() -> Melody {
    vec![
        c(&["C4", "E4", "G4"], 800), r(200),
        c(&["F4", "A4", "C5"], 800), r(200),
        n("G4", 400), n("A4", 400), r(100),
        c(&["C4", "E4", "G4"], 1000),
    ]
}

fn twelve_bar_blues_c() -> Melody {
    const C: &[&str] = &["C4", "E4", "G4"];
    const F: &[&str] = &["F4", "A4", "C5"];
    const G: &[&str] = &["G4", "B4", "D5"];

    [C, C, C, C, F, F, C, C, G, F, C, G]
        .iter()
        .flat_map(|chord| [c(chord, 800), r(200)])
        .collect()
}
