use crate::model::config::CompilerConfig;
use crate::model::event::{EventKind, RawEvent};
use crate::model::melody::{Melody, MelodyItem, Notes};
use crate::model::note::name_to_midi;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

/// A block that still had keys held when the stream ended and was closed at the last event.
#[derive(Debug, Clone, PartialEq)]
pub struct UnclosedBlock {
    pub start_ms: f64,
    pub end_ms: f64,
    /// MIDI numbers that never received a NoteOff.
    pub open_notes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compilation {
    pub melody: Melody,
    pub unclosed_blocks: Vec<UnclosedBlock>,
}

/// Stream positions of every NoteOff, grouped by MIDI number, in stream order.
struct NoteOffIndex<'a> {
    events: &'a [RawEvent],
    positions: HashMap<u8, Vec<usize>>,
}

impl<'a> NoteOffIndex<'a> {
    fn new(events: &'a [RawEvent]) -> Self {
        let mut positions: HashMap<u8, Vec<usize>> = HashMap::new();
        for (idx, event) in events.iter().enumerate() {
            if event.kind == EventKind::NoteOff {
                positions.entry(event.midi).or_default().push(idx);
            }
        }

        Self { events, positions }
    }

    /// Time of the first NoteOff for `midi` at or after stream position `from`.
    fn first_release(&self, midi: u8, from: usize) -> Option<f64> {
        let positions = self.positions.get(&midi)?;
        let idx = positions.partition_point(|&pos| pos < from);
        positions.get(idx).map(|&pos| self.events[pos].time_ms)
    }
}

/// Compiles a recording with the default timing policy, logging any recovered problems.
pub fn compile(events: &[RawEvent]) -> Melody {
    compile_events(events, &CompilerConfig::default()).melody
}

/// Groups a stream of note-ons and note-offs into a melody of notes, chords and rests.
///
/// The input does not need to be sorted: a stable sort by time is applied first, so
/// simultaneous events keep their recording order. A chord is a run of presses with no
/// release in between, all starting within the chord window. Silence before a block becomes
/// a rest even when the block is then dropped as noise. NoteOffs without a matching NoteOn are
/// ignored. Blocks whose keys are never released are closed at the time of the final event
/// and reported in [`Compilation::unclosed_blocks`].
pub fn compile_events(events: &[RawEvent], config: &CompilerConfig) -> Compilation {
    let mut compilation = Compilation::default();
    if events.is_empty() {
        return compilation;
    }

    let mut events: Vec<RawEvent> = events.to_vec();
    events.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));

    let releases = NoteOffIndex::new(&events);
    let stream_end_ms = events[events.len() - 1].time_ms;
    let mut last_block_end_ms = 0.0;
    let mut next = 0;

    while next < events.len() {
        let first = next;
        next += 1;
        if !events[first].is_note_on() {
            continue;
        }

        let block_start_ms = events[first].time_ms;
        let window_end_ms = block_start_ms + config.chord_window_ms;

        // The silence before a block is kept even if the block itself turns out to be noise.
        let gap_ms = block_start_ms - last_block_end_ms;
        if gap_ms > config.rest_threshold_ms {
            compilation.melody.push(MelodyItem::rest(round_ms(gap_ms)));
        }

        // Only the unbroken run of presses inside the window joins the block; the first
        // release ends it. Later presses of the same key replace the earlier one.
        let mut block: BTreeMap<u8, &RawEvent> = BTreeMap::new();
        block.insert(events[first].midi, &events[first]);
        while let Some(event) = events.get(next)
            && event.is_note_on()
            && event.time_ms < window_end_ms
        {
            block.insert(event.midi, event);
            next += 1;
        }

        let mut block_end_ms = block_start_ms;
        let mut open_notes: Vec<u8> = Vec::new();
        for &midi in block.keys() {
            match releases.first_release(midi, first) {
                Some(released_ms) => block_end_ms = f64::max(block_end_ms, released_ms),
                None => open_notes.push(midi),
            }
        }

        if !open_notes.is_empty() {
            warn!(
                "Block starting at {:.0}ms is missing {} NoteOff event(s), closing it at the last event ({:.0}ms)..!",
                block_start_ms,
                open_notes.len(),
                stream_end_ms
            );
            block_end_ms = f64::max(block_end_ms, stream_end_ms);
            compilation.unclosed_blocks.push(UnclosedBlock {
                start_ms: block_start_ms,
                end_ms: block_end_ms,
                open_notes,
            });
        }

        let block_duration_ms = block_end_ms - block_start_ms;
        if block_duration_ms <= config.min_block_duration_ms {
            debug!(
                "Dropping {:.1}ms block at {:.0}ms as noise..!",
                block_duration_ms, block_start_ms
            );
            continue;
        }

        let mut names: Vec<String> = block.values().map(|e| e.note_name.clone()).collect();
        names.sort();

        compilation.melody.push(MelodyItem {
            notes: Notes::from_names(names),
            duration_ms: round_ms(block_duration_ms),
        });
        last_block_end_ms = block_end_ms;
    }

    debug!(
        "Compiled {} raw event(s) into {} melody item(s)..!",
        events.len(),
        compilation.melody.len()
    );

    compilation
}

fn round_ms(ms: f64) -> u32 {
    ms.round().clamp(0.0, u32::MAX as f64) as u32
}

/// Plays a melody back as the raw events a performer would have produced, holding every
/// item for exactly its duration. Rests become silence.
pub fn melody_to_events(melody: &[MelodyItem]) -> Vec<RawEvent> {
    let mut events = Vec::new();
    let mut time_ms = 0.0;

    for item in melody {
        let end_ms = time_ms + item.duration_ms as f64;
        let keys: Vec<(u8, &String)> = item
            .notes
            .names()
            .iter()
            .filter_map(|name| match name_to_midi(name) {
                Ok(midi) => Some((midi, name)),
                Err(why) => {
                    warn!("Skipping unplayable note: {}", why);
                    None
                }
            })
            .collect();

        for &(midi, name) in keys.iter() {
            events.push(RawEvent {
                kind: EventKind::NoteOn,
                note_name: name.clone(),
                midi,
                velocity: 100,
                time_ms,
            });
        }
        for &(midi, name) in keys.iter() {
            events.push(RawEvent {
                kind: EventKind::NoteOff,
                note_name: name.clone(),
                midi,
                velocity: 0,
                time_ms: end_ms,
            });
        }

        time_ms = end_ms;
    }

    events
}
