// src/mmap.rs
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::sys;

/// A read-only memory mapping of a file.
///
/// Used to stream static assets to a socket without copying the bytes
/// through the write buffer. The mapping is released when the value drops.
#[derive(Debug)]
pub struct MappedFile {
    map: Mmap,
    path: PathBuf,
}

impl MappedFile {
    /// Map a file read-only.
    ///
    /// Fails when the path does not exist, names a directory, or is not
    /// readable; the error message carries the exact OS diagnostic so it can
    /// be quoted on an error page.
    pub fn map(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        Self::check(&path)?;

        let file = File::open(&path).map_err(|err| Error::FileAccess(sys::os_error_string(&err)))?;
        let map = unsafe { Mmap::map(&file) }
            .map_err(|err| Error::FileAccess(sys::os_error_string(&err)))?;
        Ok(Self { map, path })
    }

    fn check(path: &Path) -> Result<()> {
        let meta =
            std::fs::metadata(path).map_err(|err| Error::FileAccess(sys::os_error_string(&err)))?;
        if meta.is_dir() {
            return Err(Error::FileAccess(format!(
                "'{}' is a directory",
                path.display()
            )));
        }
        if meta.permissions().mode() & 0o400 == 0 {
            return Err(Error::FileAccess(format!(
                "No permission to access '{}'",
                path.display()
            )));
        }
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.map
    }

    pub fn size(&self) -> usize {
        self.map.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
