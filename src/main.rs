use anyhow::{Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use piano_scribe::{
    Args, BUILTIN_KEYS, Command, ConsoleEngine, DEFAULT_SAMPLE_RATE, PlaybackConfig, Player,
    compile_events, display_name, highlighted_line, identify_chord, import_midi_file, item_label,
    json_view, pitch_class_of, preview, render_melody, resolve_melody, save_melody, scroller_line,
};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.command.compiler_config();

    match args.command {
        Command::Compile {
            midi,
            output,
            transpose,
            dry_run,
            ..
        } => {
            config.validate()?;

            info!("Importing MIDI file: '{}'...", midi.display());
            let performance = import_midi_file(&midi, transpose)?;

            debug!(
                "Imported performance '{}' with {} raw events..!",
                performance
                    .metadata
                    .title
                    .clone()
                    .unwrap_or_else(|| "<unknown>".into()),
                performance.events.len()
            );

            let compilation = compile_events(&performance.events, &config);
            for block in compilation.unclosed_blocks.iter() {
                warn!(
                    "Block at {:.3}ms never released MIDI {:?}, closed at {:.3}ms..!",
                    block.start_ms, block.open_notes, block.end_ms
                );
            }

            for (i, item) in compilation.melody.iter().enumerate() {
                info!(
                    "Item {}: {:<14} duration_ms={}",
                    i,
                    item_label(item),
                    item.duration_ms
                );
            }
            println!("{}", scroller_line(&compilation.melody));

            if dry_run {
                info!("Dry run, not writing '{}'..!", output.display());
                return Ok(());
            }

            save_melody(&output, &compilation.melody)?;
        }

        Command::Chord { notes } => {
            for note in notes.iter() {
                if let Err(why) = pitch_class_of(note) {
                    warn!("{}", why);
                }
            }
            println!("{}", identify_chord(&notes));
        }

        Command::Songs => {
            for key in BUILTIN_KEYS {
                println!("{:<12} {}", key, display_name(key));
            }
        }

        Command::Show { song } => {
            let (title, melody) = resolve_melody(&song)?;
            println!("{}", title);
            println!("{}", scroller_line(&melody));
            println!("{}", json_view(&melody)?);
        }

        Command::Preview { song, index } => {
            let (title, melody) = resolve_melody(&song)?;
            let Some(item) = melody.get(index) else {
                bail!("'{}' has {} item(s), no item {}..!", title, melody.len(), index);
            };

            println!("{}", highlighted_line(&melody, index));
            let engine = ConsoleEngine::new();
            let sounded = preview(&engine, item)?;
            info!("Previewed {} of '{}' with {} tone(s)..!", item_label(item), title, sounded);
        }

        Command::Play {
            song,
            speed,
            wav,
            verbose,
        } => {
            let (title, melody) = resolve_melody(&song)?;
            let playback = PlaybackConfig {
                speed,
                ..PlaybackConfig::default()
            };

            if let Some(path) = wav {
                info!("Rendering '{}' to '{}'...", title, path.display());
                let engine = render_melody(&melody, &playback, DEFAULT_SAMPLE_RATE)?;
                engine.write_wav(&path)?;
                return Ok(());
            }

            let player = Player::with_config(ConsoleEngine::new(), verbose, playback)?;
            player.load_melody(&title, melody)?;

            let player = Arc::new(player);
            let player_for_handler = Arc::clone(&player);

            ctrlc::set_handler(move || {
                warn!("Ctrl-C received, stopping playback..!");
                let _ = player_for_handler.stop();
            })?;

            player.play(true)?;
            info!(
                "Playback finished after {} tone(s), exiting..!",
                player.engine().tones_played()
            );
        }
    }

    Ok(())
}
