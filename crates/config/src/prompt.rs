//! System prompt loading

use std::path::Path;

use crate::ConfigError;

/// Read the system prompt file
///
/// Leading and trailing whitespace (including newlines) is removed; the
/// interior is kept verbatim.
pub fn load_prompt(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
        _ => ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })?;

    let prompt = raw.trim().to_string();
    tracing::debug!(path = %path.display(), chars = prompt.len(), "Loaded system prompt");
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_prompt_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\n\n  You are a helpful assistant.\n  Be brief.  \n\n").unwrap();

        let prompt = load_prompt(file.path()).unwrap();
        assert_eq!(prompt, "You are a helpful assistant.\n  Be brief.");
    }

    #[test]
    fn test_empty_prompt_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(load_prompt(file.path()).unwrap(), "");
    }

    #[test]
    fn test_missing_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_prompt(dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_invalid_utf8_is_io_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0x00]).unwrap();
        let err = load_prompt(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
