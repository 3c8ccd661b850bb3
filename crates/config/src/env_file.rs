//! Dotenv loading

use std::path::Path;

use crate::ConfigError;

/// Load a dotenv file into the process environment
///
/// Variables already set in the environment win. A missing file is not an
/// error; returns whether the file was found.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No dotenv file");
        return Ok(false);
    }

    dotenvy::from_path(path)
        .map_err(|e| ConfigError::Environment(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), "Loaded dotenv file");
    Ok(true)
}
