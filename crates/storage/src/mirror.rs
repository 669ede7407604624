use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quiz_core::model::{QuizProgress, UserId};
use tracing::debug;

use crate::repository::{LocalMirror, StorageError, mirror_key};

fn io_err(e: io::Error) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Local mirror backed by one JSON file per user in a directory.
///
/// Writes land in a temporary file that is renamed over the entry, so a
/// crash mid-write leaves the previous entry intact.
#[derive(Debug, Clone)]
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, user: &UserId) -> PathBuf {
        self.dir.join(format!("{}.json", mirror_key(user)))
    }
}

impl LocalMirror for FileMirror {
    fn get(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError> {
        let path = self.entry_path(user);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn put(&self, user: &UserId, progress: &QuizProgress) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let raw = serde_json::to_vec(progress)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let path = self.entry_path(user);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&raw).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, &path).map_err(io_err)?;
        debug!(user = %user, bytes = raw.len(), "local mirror written");
        Ok(())
    }

    fn delete(&self, user: &UserId) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(user)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }
}
