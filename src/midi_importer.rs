use crate::model::event::*;
use anyhow::{Result, anyhow};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

#[derive(Debug, Clone)]
struct TempoSegment {
    pub mpqn: u32,
    pub start_tick: u64,
    pub ms_at_start: f64,
}

/// A key press or release before tick-to-time conversion.
struct TickEvent {
    tick: u64,
    kind: EventKind,
    key: u8,
    velocity: u8,
}

/// Reads a Standard MIDI File and flattens every track into one timeline of raw events,
/// exactly as if the take had been captured live.
pub fn import_midi_file<P: AsRef<Path>>(path: P, transpose_semitones: i32) -> Result<Performance> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let title = path
        .as_ref()
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    midi_bytes_to_performance(&bytes, title, transpose_semitones)
}

pub fn midi_bytes_to_performance(
    bytes: &[u8],
    title: Option<String>,
    transpose_semitones: i32,
) -> Result<Performance> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };

    if ticks_per_quarter == 0 {
        return Err(anyhow!("MIDI header declares zero ticks per quarter note..!"));
    }

    let mut track_name: Option<String> = None;

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    tempo_changes.push((0u64, DEFAULT_MPQN)); // ~120bpm until a tempo meta appears

    let mut tick_events: Vec<TickEvent> = Vec::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let mpqn: u32 = micro.as_int();
                        tempo_changes.push((abs_tick, mpqn));
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, mpqn, track_idx
                        );
                    }
                    MetaMessage::TrackName(bytes) => {
                        if track_name.is_none() {
                            let name = String::from_utf8_lossy(bytes).trim().to_string();
                            debug!("Track name: {}", name);
                            if !name.is_empty() {
                                track_name = Some(name);
                            }
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } => {
                        let velocity: u8 = vel.as_int();
                        tick_events.push(TickEvent {
                            tick: abs_tick,
                            kind: if velocity == 0 {
                                EventKind::NoteOff
                            } else {
                                EventKind::NoteOn
                            },
                            key: key.as_int(),
                            velocity,
                        });
                    }
                    MidiMessage::NoteOff { key, vel: _ } => {
                        tick_events.push(TickEvent {
                            tick: abs_tick,
                            kind: EventKind::NoteOff,
                            key: key.as_int(),
                            velocity: 0,
                        });
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    let tempo_segments = build_tempo_segments(tempo_changes, ticks_per_quarter);
    let ticks_to_ms = |tick: u64| -> f64 {
        let segment = match tempo_segments.iter().rfind(|seg| seg.start_tick <= tick) {
            Some(s) => s,
            None => &tempo_segments[0],
        };

        let delta_ticks = tick.saturating_sub(segment.start_tick) as f64;
        segment.ms_at_start
            + delta_ticks * (segment.mpqn as f64) / (ticks_per_quarter as f64) / 1000.0
    };

    let mut events: Vec<RawEvent> = Vec::with_capacity(tick_events.len());
    for tick_event in tick_events.into_iter() {
        let note_id = tick_event.key as i32 + transpose_semitones;

        if !(0..=127).contains(&note_id) {
            warn!(
                "Dropping out-of-range MIDI {} (from {}) after transpose..!",
                note_id, tick_event.key
            );
            continue;
        }

        let time_ms = ticks_to_ms(tick_event.tick);
        let event = match tick_event.kind {
            EventKind::NoteOn => RawEvent::note_on(note_id as u8, tick_event.velocity, time_ms),
            EventKind::NoteOff => RawEvent::note_off(note_id as u8, time_ms),
        };

        if let Some(event) = event {
            events.push(event);
        }
    }

    // Stable, so simultaneous events keep their track order.
    events.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms));

    // skipping first segment because it was built from our default mpqn
    let tempo_bpm = match tempo_segments.get(1) {
        Some(tempo) => MICROSECONDS_PER_MINUTE / (tempo.mpqn as f64),
        None => MICROSECONDS_PER_MINUTE / (DEFAULT_MPQN as f64),
    };

    Ok(Performance {
        metadata: Metadata {
            title: title.or(track_name),
            tempo_bpm: Some(tempo_bpm),
        },
        events,
    })
}

fn build_tempo_segments(mut tempo_changes: Vec<(u64, u32)>, ticks_per_quarter: u64) -> Vec<TempoSegment> {
    let mut last_tick: u64 = 0;
    let mut ms_accum: f64 = 0.0;
    let mut last_mpqn: u32 = DEFAULT_MPQN;
    let mut tempo_segments: Vec<TempoSegment> = Vec::new();

    // stable, so a tempo set at tick 0 lands after our default and wins
    tempo_changes.sort_by_key(|(tick, _)| *tick);

    for (tick, mpqn) in tempo_changes.into_iter() {
        if tick > last_tick {
            let delta_ticks = (tick - last_tick) as f64;
            ms_accum += delta_ticks * (last_mpqn as f64) / (ticks_per_quarter as f64) / 1000.0;
        }

        // ms_at_start reflects the ms accumulated up to this tick
        tempo_segments.push(TempoSegment {
            start_tick: tick,
            mpqn,
            ms_at_start: ms_accum,
        });

        last_tick = tick;
        last_mpqn = mpqn;
    }

    tempo_segments
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::compile;
    use crate::model::melody::MelodyItem;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, TrackEvent};

    const EPSILON_MS: f64 = 0.01;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPSILON_MS
    }

    fn note(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn release(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(64),
                },
            },
        }
    }

    fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(message),
        }
    }

    /// 500 ticks per quarter at the default tempo: one tick per millisecond.
    fn write_smf(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let format = if tracks.len() > 1 {
            Format::Parallel
        } else {
            Format::SingleTrack
        };
        let smf = Smf {
            header: Header::new(format, Timing::Metrical(u15::new(500))),
            tracks,
        };

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn chord_then_melody() {
        env_logger::try_init().unwrap_or(());

        let bytes = write_smf(vec![vec![
            note(0, 60, 100),
            note(10, 64, 100),
            note(10, 67, 100),
            release(480, 60),
            release(0, 64),
            note(0, 60, 0), // duplicate release, as velocity 0
            release(10, 67),
            note(290, 72, 90),
            release(400, 72),
            meta(0, MetaMessage::EndOfTrack),
        ]]);

        let performance = midi_bytes_to_performance(&bytes, Some("take".into()), 0).unwrap();
        assert_eq!(performance.metadata.title.as_deref(), Some("take"));
        assert!(approx_eq(performance.metadata.tempo_bpm.unwrap(), 120.0));
        assert_eq!(performance.events.len(), 9);

        let first = &performance.events[0];
        assert_eq!(first.kind, EventKind::NoteOn);
        assert_eq!(first.note_name, "C4");
        assert!(approx_eq(first.time_ms, 0.0));
        assert!(approx_eq(performance.events[2].time_ms, 20.0));

        assert_eq!(
            compile(&performance.events),
            vec![
                MelodyItem::chord(["C4", "E4", "G4"], 510),
                MelodyItem::rest(290),
                MelodyItem::single("C5", 400),
            ]
        );
    }

    #[test]
    fn tempo_changes_rescale_time() {
        env_logger::try_init().unwrap_or(());

        let bytes = write_smf(vec![vec![
            note(0, 60, 100),
            release(500, 60),
            // Half the speed from here on: one tick = 2ms.
            meta(0, MetaMessage::Tempo(u24::new(1_000_000))),
            note(0, 62, 100),
            release(500, 62),
            meta(0, MetaMessage::EndOfTrack),
        ]]);

        let performance = midi_bytes_to_performance(&bytes, None, 0).unwrap();
        let times: Vec<f64> = performance.events.iter().map(|e| e.time_ms).collect();
        assert!(approx_eq(times[1], 500.0));
        assert!(approx_eq(times[2], 500.0));
        assert!(approx_eq(times[3], 1500.0));
        assert!(approx_eq(performance.metadata.tempo_bpm.unwrap(), 60.0));
    }

    #[test]
    fn tracks_are_merged() {
        env_logger::try_init().unwrap_or(());

        let bytes = write_smf(vec![
            vec![
                meta(0, MetaMessage::TrackName(b"Piano")),
                note(0, 48, 100),
                release(800, 48),
                meta(0, MetaMessage::EndOfTrack),
            ],
            vec![
                note(5, 64, 100),
                release(400, 64),
                meta(0, MetaMessage::EndOfTrack),
            ],
        ]);

        let performance = midi_bytes_to_performance(&bytes, None, 0).unwrap();
        assert_eq!(performance.metadata.title.as_deref(), Some("Piano"));
        assert_eq!(
            compile(&performance.events),
            vec![MelodyItem::chord(["C3", "E4"], 800)]
        );
    }

    #[test]
    fn transpose_drops_out_of_range_notes() {
        env_logger::try_init().unwrap_or(());

        let bytes = write_smf(vec![vec![
            note(0, 60, 100),
            note(0, 125, 100),
            release(300, 60),
            release(0, 125),
            meta(0, MetaMessage::EndOfTrack),
        ]]);

        let performance = midi_bytes_to_performance(&bytes, None, 5).unwrap();
        assert_eq!(performance.events.len(), 2);
        assert!(performance.events.iter().all(|e| e.note_name == "F4"));
    }

    #[test]
    fn rejects_garbage() {
        env_logger::try_init().unwrap_or(());

        assert!(midi_bytes_to_performance(b"not a midi file", None, 0).is_err());
        assert!(import_midi_file("./does/not/exist.mid", 0).is_err());
    }
}
