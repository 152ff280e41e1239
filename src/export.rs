use crate::model::melody::{Melody, MelodyItem};
use anyhow::{Result, anyhow, bail};
use log::info;
use std::fs;
use std::path::Path;

pub fn melody_to_json(melody: &[MelodyItem]) -> Result<String> {
    Ok(serde_json::to_string_pretty(melody)?)
}

/// Parses and validates a melody document.
pub fn melody_from_json(json: &str) -> Result<Melody> {
    serde_json::from_str(json).map_err(|e| anyhow!("Invalid melody JSON: {}", e))
}

/// Writes `melody` as pretty JSON. Refuses to write an empty melody.
pub fn save_melody<P: AsRef<Path>>(path: P, melody: &[MelodyItem]) -> Result<()> {
    if melody.is_empty() {
        bail!("Nothing recorded to save..!");
    }

    let json = melody_to_json(melody)?;
    fs::write(path.as_ref(), json).map_err(|e| {
        anyhow!(
            "Failed to write melody to {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    info!(
        "Saved {} item(s) to {}..!",
        melody.len(),
        path.as_ref().display()
    );

    Ok(())
}

pub fn load_melody<P: AsRef<Path>>(path: P) -> Result<Melody> {
    let json = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read melody file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    melody_from_json(&json)
}
