//! Local certificate cache directory.
//!
//! The directory is flat: one file per certificate artifact, the file name
//! shared verbatim with the object key suffix. The issuance collaborator
//! writes here independently, so every snapshot is read fresh from disk.
//!
//! Writes land through a temporary file in the same directory followed by
//! a rename, so a reader sees either the old or the new file, never a
//! partial one.

use crate::error::{CacheSyncError, CacheSyncResult};
use crate::types::CachedFile;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, trace};

/// Handle on the cache directory. Cheap to clone.
#[derive(Clone, Debug)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    /// Opens the cache directory, creating it (0700 on Unix) if absent.
    ///
    /// # Errors
    ///
    /// Returns `Filesystem` if the directory cannot be created; nothing can
    /// run without it.
    pub fn open(dir: impl Into<PathBuf>) -> CacheSyncResult<Self> {
        let cache = Self { dir: dir.into() };
        cache.ensure_dir()?;
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a cache file, after validating the name.
    pub fn path_for(&self, name: &str) -> CacheSyncResult<PathBuf> {
        validate_name(name).map_err(|reason| {
            CacheSyncError::filesystem(
                self.dir.join(name),
                std::io::Error::new(ErrorKind::InvalidInput, reason),
            )
        })?;
        Ok(self.dir.join(name))
    }

    /// Lists the synchronizable files currently in the directory.
    ///
    /// A missing directory is recreated and reported as empty.
    pub fn snapshot(&self) -> CacheSyncResult<Vec<CachedFile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_dir()?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(CacheSyncError::filesystem(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheSyncError::filesystem(&self.dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                trace!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };
            if !is_sync_candidate(&name) {
                trace!(name = %name, "skipping temporary or hidden file");
                continue;
            }

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                // Removed between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheSyncError::filesystem(entry.path(), e)),
            };
            if !meta.is_file() {
                continue;
            }
            if meta.len() == 0 {
                debug!(name = %name, "skipping empty cache file");
                continue;
            }

            let modified = meta
                .modified()
                .map_err(|e| CacheSyncError::filesystem(entry.path(), e))?;
            files.push(CachedFile {
                name,
                modified: DateTime::<Utc>::from(modified),
                len: meta.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Reads a whole cache file.
    pub fn read(&self, name: &str) -> CacheSyncResult<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|e| CacheSyncError::filesystem(path, e))
    }

    /// Replaces `name` atomically with `data`.
    ///
    /// When `modified` is given the new file carries that modification
    /// time, so a pulled copy compares equal to the object it came from.
    pub fn write_atomic(
        &self,
        name: &str,
        data: &[u8],
        modified: Option<DateTime<Utc>>,
    ) -> CacheSyncResult<()> {
        let path = self.path_for(name)?;
        self.ensure_dir()?;

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| CacheSyncError::filesystem(&self.dir, e))?;

        if let Err(e) = tmp.write_all(data) {
            return Err(CacheSyncError::filesystem(tmp.path(), e));
        }
        if let Err(e) = tmp.flush() {
            return Err(CacheSyncError::filesystem(tmp.path(), e));
        }
        if let Some(modified) = modified {
            tmp.as_file()
                .set_modified(SystemTime::from(modified))
                .map_err(|e| CacheSyncError::filesystem(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| CacheSyncError::filesystem(tmp.path(), e))?;

        tmp.persist(&path)
            .map_err(|e| CacheSyncError::filesystem(&path, e.error))?;

        trace!(name = %name, bytes = data.len(), "wrote cache file");
        Ok(())
    }

    fn ensure_dir(&self) -> CacheSyncResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| CacheSyncError::filesystem(&self.dir, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| CacheSyncError::filesystem(&self.dir, e))?;
        }

        info!(cache_dir = %self.dir.display(), "created certificate cache directory");
        Ok(())
    }
}

/// Hidden files are never synchronized. In-flight writes are hidden too:
/// [`LocalCache::write_atomic`] stages them as `.<name>.XXXXXX.tmp`.
pub fn is_sync_candidate(name: &str) -> bool {
    !name.starts_with('.')
}

fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() || name == "." || name == ".." {
        return Err("empty or relative cache file name");
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err("cache file name contains a path separator");
    }
    Ok(())
}
