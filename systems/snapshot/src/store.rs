use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{Snapshot, SnapshotError};

/// File-backed persistence for a single lifecycle snapshot.
///
/// Writes go to a sibling temporary file first and are renamed into place,
/// so an interrupted save leaves the previous snapshot intact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Creates a store persisting to the provided path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists the snapshot as JSON.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let json = snapshot.to_json()?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json).map_err(|source| self.io_error(&staging, source))?;
        fs::rename(&staging, &self.path).map_err(|source| self.io_error(&self.path, source))?;
        debug!("saved snapshot to {}", self.path.display());
        Ok(())
    }

    /// Loads the persisted snapshot, returning `None` when no file exists.
    pub fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(&self.path, source)),
        };
        Snapshot::from_json(&text).map(Some)
    }

    /// Loads the persisted snapshot, substituting the dormant baseline when
    /// the file is absent or unreadable.
    #[must_use]
    pub fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => Snapshot::default(),
            Err(error) => {
                warn!(
                    "could not restore snapshot from {}: {error}",
                    self.path.display()
                );
                Snapshot::default()
            }
        }
    }

    /// Removes the persisted snapshot if one exists.
    pub fn clear(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(&self.path, source)),
        }
    }

    fn io_error(&self, path: &Path, source: io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
