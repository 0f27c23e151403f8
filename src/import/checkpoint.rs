//! Durable byte-offset checkpoint of a script import.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StewardError};

/// Suffix of the file holding the resume offset.
pub const CHECKPOINT_SUFFIX: &str = "_filepointer";

/// Suffix of the file collecting failed-statement messages.
pub const ERROR_LOG_SUFFIX: &str = "_error";

/// Appends `suffix` to the full file name of `path`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// The resume offset of one script, stored as a decimal number in a sibling file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    /// Checkpoint belonging to the script at `script`.
    pub fn for_script(script: &Path) -> Self {
        Self {
            path: sibling_path(script, CHECKPOINT_SUFFIX),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored offset; `None` when no checkpoint exists.
    pub fn load(&self) -> Result<Option<u64>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        content.trim().parse().map(Some).map_err(|_| {
            StewardError::invalid_argument(format!(
                "Malformed checkpoint {}: '{}'",
                self.path.display(),
                content.trim()
            ))
        })
    }

    /// Overwrites the stored offset.
    pub fn save(&self, offset: u64) -> Result<()> {
        fs::write(&self.path, offset.to_string())?;
        Ok(())
    }

    /// Removes the checkpoint. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Appends one line to the error log next to `script`.
pub fn append_error_line(script: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(sibling_path(script, ERROR_LOG_SUFFIX))?;
    writeln!(file, "{line}")?;
    Ok(())
}
