//! Script output.
//!
//! The script is staged in a temporary file next to the destination and
//! renamed over it on commit, so the destination holds either the previous
//! content or the complete new script.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::Result;
use crate::assembly::Script;
use crate::error::GenerateScriptError;

/// Staged output file. Dropping it without [`ScriptWriter::commit`]
/// removes the staging file.
#[derive(Debug)]
pub struct ScriptWriter {
    destination: PathBuf,
    staging: NamedTempFile,
}

impl ScriptWriter {
    /// Validates the destination and creates the staging file.
    ///
    /// # Errors
    /// Returns an I/O error if the destination is a directory or its parent
    /// directory is missing or not writable.
    pub fn prepare(destination: impl AsRef<Path>) -> Result<Self> {
        let destination = destination.as_ref().to_path_buf();
        if destination.is_dir() {
            return Err(GenerateScriptError::io(
                format!("Cannot write script to {}", destination.display()),
                std::io::Error::other("destination is a directory"),
            ));
        }

        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(".generatescript-").suffix(".tmp");
        // Same mode as File::create: 0o666 narrowed by the umask.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }

        let staging = builder
            .tempfile_in(&directory)
            .map_err(|e| {
                GenerateScriptError::io(
                    format!("Cannot create output file in {}", directory.display()),
                    e,
                )
            })?;
        debug!("Staging script in {}", staging.path().display());

        Ok(Self {
            destination,
            staging,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Writes the script as UTF-8 and moves it to the destination,
    /// replacing any existing file.
    ///
    /// # Errors
    /// Returns an I/O error if writing, syncing or renaming fails.
    pub fn commit(mut self, script: &Script) -> Result<PathBuf> {
        let context = || format!("Failed to write to {}", self.destination.display());

        self.staging
            .write_all(script.as_str().as_bytes())
            .map_err(|e| GenerateScriptError::io(context(), e))?;
        self.staging
            .flush()
            .map_err(|e| GenerateScriptError::io(context(), e))?;
        self.staging
            .as_file()
            .sync_all()
            .map_err(|e| GenerateScriptError::io(context(), e))?;

        // A replaced script keeps its permissions.
        if let Ok(existing) = std::fs::metadata(&self.destination) {
            self.staging
                .as_file()
                .set_permissions(existing.permissions())
                .map_err(|e| GenerateScriptError::io(context(), e))?;
        }

        self.staging
            .persist(&self.destination)
            .map_err(|e| GenerateScriptError::io(context(), e.error))?;
        Ok(self.destination)
    }
}
