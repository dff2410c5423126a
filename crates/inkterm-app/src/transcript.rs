//! The transcript file a headless session reads at start and writes back on exit.

use std::path::Path;

/// Read the transcript at `path`, creating it with `seed` if it does not exist.
pub fn load_or_seed(path: &Path, seed: &str) -> Result<String, String> {
    if path.exists() {
        return std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()));
    }

    save(path, seed)?;
    log::info!("created transcript {}", path.display());
    Ok(seed.to_string())
}

pub fn save(path: &Path, text: &str) -> Result<(), String> {
    std::fs::write(path, text).map_err(|e| format!("failed to write {}: {e}", path.display()))
}
