use crate::export::load_melody;
use crate::model::melody::Melody;
use crate::model::songs::{BUILTIN_KEYS, builtin_melody, display_name};
use anyhow::{Result, bail};
use log::{debug, info};
use std::path::Path;

/// Playback speeds must be finite and strictly positive.
pub fn check_speed(speed: f64) -> Result<f64> {
    if !speed.is_finite() || speed <= 0.0 {
        bail!("Playback speed must be a positive number, got {}..!", speed);
    }

    Ok(speed)
}

/// Resolves a bundled song key or a path to a melody JSON file into a title and its melody.
pub fn resolve_melody(song: &str) -> Result<(String, Melody)> {
    if let Some(melody) = builtin_melody(song) {
        debug!("Using bundled song '{}'..!", song);
        return Ok((display_name(song), melody));
    }

    let path = Path::new(song);
    if !path.exists() {
        bail!(
            "'{}' is neither a bundled song ({}) nor an existing file..!",
            song,
            BUILTIN_KEYS.join(", ")
        );
    }

    info!("Loading melody file: '{}'...", path.display());
    let melody = load_melody(path)?;
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(song)
        .to_string();

    Ok((title, melody))
}
