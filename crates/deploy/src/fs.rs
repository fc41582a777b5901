//! File system utils.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use fs2::FileExt;

pub struct FsHandler;

impl FsHandler {
    /// Create a directory (and its parents) if it doesn't exist.
    pub fn create_dir(path: &Path) -> io::Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
            tracing::debug!("Created directory: {}", path.display());
        }
        Ok(())
    }

    /// Replace the content of `path` atomically.
    ///
    /// The content is written and synced to a sibling temporary file which is then renamed over
    /// the target, so readers see either the old or the new content, never a partial write.
    pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp_path, path)
    }

    /// Take an exclusive advisory lock on `path`, creating the file if needed.
    ///
    /// Returns `Ok(None)` when another process holds the lock. The lock is released when the
    /// returned file is dropped.
    pub fn try_lock(path: &Path) -> io::Result<Option<File>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(file)),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
