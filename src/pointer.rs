//! Maintenance of the logical "current file" pointer
//!
//! Clients open a stable logical path; the sink keeps it pointing at the
//! newest timestamped backup. On unix this is a symlink. Platforms without
//! usable symlinks fall back to a small pointer file holding the target path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Capability for repointing the logical path at the current backup file.
pub trait CurrentPointer: Send + Sync {
    /// Make `link` refer to `target`, replacing any previous pointer.
    fn repoint(&self, link: &Path, target: &Path) -> io::Result<()>;

    /// Resolve `link` back to the file it currently refers to.
    fn resolve(&self, link: &Path) -> io::Result<PathBuf>;
}

/// Pick the pointer implementation for this platform.
pub fn platform_default() -> Box<dyn CurrentPointer> {
    #[cfg(unix)]
    {
        Box::new(SymlinkPointer)
    }
    #[cfg(not(unix))]
    {
        Box::new(PointerFile)
    }
}

/// Symlink-backed pointer (unix).
#[cfg(unix)]
pub struct SymlinkPointer;

#[cfg(unix)]
impl CurrentPointer for SymlinkPointer {
    fn repoint(&self, link: &Path, target: &Path) -> io::Result<()> {
        if fs::symlink_metadata(link).is_ok() {
            fs::remove_file(link)?;
        }
        std::os::unix::fs::symlink(target, link)
    }

    fn resolve(&self, link: &Path) -> io::Result<PathBuf> {
        fs::read_link(link)
    }
}

/// Fallback pointer: the logical path is a regular file whose contents are
/// the target path. Replaced via write-to-temp plus rename so readers never
/// observe a half-written pointer.
pub struct PointerFile;

impl CurrentPointer for PointerFile {
    fn repoint(&self, link: &Path, target: &Path) -> io::Result<()> {
        let tmp = link.with_extension("ptr.tmp");
        fs::write(&tmp, target.display().to_string())?;
        fs::rename(&tmp, link)
    }

    fn resolve(&self, link: &Path) -> io::Result<PathBuf> {
        let contents = fs::read_to_string(link)?;
        Ok(PathBuf::from(contents.trim()))
    }
}
