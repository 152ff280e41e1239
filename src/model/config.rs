use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CHORD_WINDOW_MS: f64 = 50.0;
pub const DEFAULT_REST_THRESHOLD_MS: f64 = 180.0;
pub const DEFAULT_MIN_BLOCK_DURATION_MS: f64 = 20.0;
pub const DEFAULT_NOTE_GAP_MS: f64 = 50.0;
pub const DEFAULT_EXPORT_FILE: &str = "recorded-melody.json";

/// Anything longer than this rounds to at least one whole millisecond.
pub const MIN_ITEM_THRESHOLD_MS: f64 = 0.5;

/// Timing policy used when turning a recording into a melody.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CompilerConfig {
    /// Note-ons starting less than this long after a block's first note join its chord.
    pub chord_window_ms: f64,

    /// Silences longer than this between blocks become explicit rests.
    pub rest_threshold_ms: f64,

    /// Blocks that do not last longer than this are dropped as noise.
    pub min_block_duration_ms: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            chord_window_ms: DEFAULT_CHORD_WINDOW_MS,
            rest_threshold_ms: DEFAULT_REST_THRESHOLD_MS,
            min_block_duration_ms: DEFAULT_MIN_BLOCK_DURATION_MS,
        }
    }
}

impl CompilerConfig {
    /// Rejects negative or non-finite timings, and thresholds so small that an item could
    /// round down to zero milliseconds.
    pub fn validate(&self) -> Result<()> {
        if !self.chord_window_ms.is_finite() || self.chord_window_ms < 0.0 {
            bail!(
                "Chord window must be zero or more milliseconds, got {}..!",
                self.chord_window_ms
            );
        }

        for (name, value) in [
            ("Rest threshold", self.rest_threshold_ms),
            ("Minimum block duration", self.min_block_duration_ms),
        ] {
            if !value.is_finite() || value < MIN_ITEM_THRESHOLD_MS {
                bail!(
                    "{} must be at least {}ms, got {}..!",
                    name,
                    MIN_ITEM_THRESHOLD_MS,
                    value
                );
            }
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Tempo multiplier, 2.0 plays twice as fast.
    pub speed: f64,

    /// Silence inserted after every item, before scaling by `speed`.
    pub note_gap_ms: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            note_gap_ms: DEFAULT_NOTE_GAP_MS,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "piano_scribe",
    about = "Turn MIDI performances into melodies, name their chords and play them back!"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the notes of a MIDI file into a melody and save it as JSON.
    Compile {
        /// Path to the recorded MIDI file.
        midi: PathBuf,

        /// Where to write the melody JSON.
        #[arg(short, long, default_value = DEFAULT_EXPORT_FILE)]
        output: PathBuf,

        /// Transpose in semitones (positive or negative).
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        transpose: i32,

        /// Maximum spread between note-ons of the same chord.
        #[arg(long, default_value_t = DEFAULT_CHORD_WINDOW_MS)]
        chord_window_ms: f64,

        /// Minimum silence recorded as a rest.
        #[arg(long, default_value_t = DEFAULT_REST_THRESHOLD_MS)]
        rest_threshold_ms: f64,

        /// Blocks this short or shorter are discarded as noise.
        #[arg(long = "min-block-ms", default_value_t = DEFAULT_MIN_BLOCK_DURATION_MS)]
        min_block_duration_ms: f64,

        /// Print the melody without writing the JSON file.
        #[arg(short, long, default_value_t = false)]
        dry_run: bool,
    },

    /// Name the chord formed by a set of notes, e.g. `chord E4 G4 C5`.
    Chord {
        #[arg(required = true)]
        notes: Vec<String>,
    },

    /// List the bundled songs.
    Songs,

    /// Print the note display and JSON view of a bundled song or melody file.
    Show {
        /// Bundled song key (see `songs`) or path to a melody JSON file.
        song: String,
    },

    /// Sound one item of a bundled song or melody file briefly.
    Preview {
        /// Bundled song key (see `songs`) or path to a melody JSON file.
        song: String,

        /// Zero-based position of the item.
        index: usize,
    },

    /// Play a bundled song or melody file.
    Play {
        /// Bundled song key (see `songs`) or path to a melody JSON file.
        song: String,

        /// Playback speed multiplier.
        #[arg(short, long, default_value_t = 1.0)]
        speed: f64,

        /// Render the performance to a WAV file instead of playing it in real time.
        #[arg(long)]
        wav: Option<PathBuf>,

        /// Prints every item as it is played.
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Command {
    /// The compiler policy assembled from `compile` flags, defaults for everything else.
    pub fn compiler_config(&self) -> CompilerConfig {
        match self {
            Command::Compile {
                chord_window_ms,
                rest_threshold_ms,
                min_block_duration_ms,
                ..
            } => CompilerConfig {
                chord_window_ms: *chord_window_ms,
                rest_threshold_ms: *rest_threshold_ms,
                min_block_duration_ms: *min_block_duration_ms,
            },
            _ => CompilerConfig::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compile_flags_override_defaults() {
        let args = Args::parse_from([
            "piano_scribe",
            "compile",
            "take.mid",
            "--chord-window-ms",
            "80",
            "--min-block-ms",
            "5",
            "-t",
            "-12",
        ]);

        let config = args.command.compiler_config();
        assert_eq!(config.chord_window_ms, 80.0);
        assert_eq!(config.rest_threshold_ms, DEFAULT_REST_THRESHOLD_MS);
        assert_eq!(config.min_block_duration_ms, 5.0);

        match args.command {
            Command::Compile { transpose, output, .. } => {
                assert_eq!(transpose, -12);
                assert_eq!(output, PathBuf::from(DEFAULT_EXPORT_FILE));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn policy_validation() {
        assert!(CompilerConfig::default().validate().is_ok());

        let zero_window = CompilerConfig {
            chord_window_ms: 0.0,
            ..CompilerConfig::default()
        };
        assert!(zero_window.validate().is_ok());

        let bad = [
            CompilerConfig {
                chord_window_ms: -1.0,
                ..CompilerConfig::default()
            },
            CompilerConfig {
                rest_threshold_ms: f64::NAN,
                ..CompilerConfig::default()
            },
            CompilerConfig {
                min_block_duration_ms: 0.2,
                ..CompilerConfig::default()
            },
            CompilerConfig {
                min_block_duration_ms: f64::INFINITY,
                ..CompilerConfig::default()
            },
        ];
        for config in bad.iter() {
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }

        let args = Args::parse_from(["piano_scribe", "compile", "take.mid", "--min-block-ms=-3"]);
        assert!(args.command.compiler_config().validate().is_err());
    }

    #[test]
    fn other_commands_use_default_policy() {
        let args = Args::parse_from(["piano_scribe", "chord", "C4", "E4", "G4"]);
        assert_eq!(args.command.compiler_config(), CompilerConfig::default());
    }
}
