//! File system utils.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs2::FileExt;

/// Name of the lock file held in the output directory for the duration of a run.
pub const LOCK_FILENAME: &str = ".launchpad.lock";

pub struct FsHandler;

impl FsHandler {
    pub fn set_writable(path: &Path) -> anyhow::Result<()> {
        let metadata = std::fs::metadata(path).context("Failed to get metadata for file")?;

        let mut perms = metadata.permissions();

        perms.set_readonly(false);

        std::fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

        Ok(())
    }

    /// Create the output data directory if it doesn't exist and return its canonical path.
    pub fn create_outdata_directory(path: &Path) -> anyhow::Result<PathBuf> {
        if !path.try_exists().with_context(|| {
            format!(
                "Failed to check if output data directory exists at path {}. Ensure you provided valid permissions to the directory.",
                path.display()
            )
        })? {
            std::fs::create_dir_all(path)
                .context("Failed to create output data directory")?;
            tracing::debug!("Created output data directory: {}", path.display());
        }

        Self::set_writable(path)
            .context("Failed to set permissions on output data directory")?;

        path.canonicalize()
            .context("Failed to canonicalize output data directory path")
    }
}

/// Exclusive lock on an output directory. Released on drop.
#[derive(Debug)]
pub struct OutdataLock {
    file: File,
    path: PathBuf,
}

impl OutdataLock {
    /// Take the lock, failing immediately if another run holds it.
    pub fn acquire(outdata: &Path) -> anyhow::Result<Self> {
        let path = outdata.join(LOCK_FILENAME);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create lock file {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "Another launchpad run is using {}. Wait for it to finish or remove {}",
                outdata.display(),
                path.display()
            )
        })?;

        tracing::debug!(path = %path.display(), "Output directory locked");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutdataLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_create_outdata_directory() {
        let tmp = TempDir::new("launchpad-fs").unwrap();
        let nested = tmp.path().join("a").join("b");

        let created = FsHandler::create_outdata_directory(&nested).unwrap();
        assert!(created.is_dir());
        assert!(created.is_absolute());

        // Idempotent.
        assert_eq!(FsHandler::create_outdata_directory(&nested).unwrap(), created);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let tmp = TempDir::new("launchpad-lock").unwrap();

        let lock = OutdataLock::acquire(tmp.path()).unwrap();
        assert!(lock.path().ends_with(LOCK_FILENAME));
        assert!(OutdataLock::acquire(tmp.path()).is_err());

        drop(lock);
        assert!(OutdataLock::acquire(tmp.path()).is_ok());
    }
}
