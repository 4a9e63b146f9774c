//! Filesystem primitives used by the activation strategies.
//!
//! Activation goes through the [`FileSystem`] trait rather than `std::fs`
//! directly so that backup and rollback paths can be exercised against
//! injected failures.

use std::io;
use std::path::{Path, PathBuf};

/// Filesystem operations needed to back up, populate and restore a directory.
pub trait FileSystem {
    /// Whether `path` exists, following symlinks.
    fn exists(&self, path: &Path) -> bool;

    /// Whether an entry exists at `path` without following symlinks
    /// (true for broken symlinks).
    fn entry_exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Lists the entries of a directory, sorted by path.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recursively copies the contents of `from` into `to`, creating `to`.
    fn copy_dir(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Creates a symlink at `link` pointing to the file `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn entry_exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn copy_dir(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            let source = entry.path();
            let dest = to.join(entry.file_name());
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                self.copy_dir(&source, &dest)?;
            } else if file_type.is_symlink() {
                copy_symlink(&source, &dest)?;
            } else {
                std::fs::copy(&source, &dest)?;
            }
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }

        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_file(target, link)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = (target, link);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlinks are not supported on this platform",
            ))
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    let target = std::fs::read_link(source)?;
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    std::fs::copy(source, dest).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_dir_copies_nested_contents() {
        let temp = tempfile::tempdir().unwrap();
        let from = temp.path().join("from");
        std::fs::create_dir_all(from.join("lib").join("std")).unwrap();
        std::fs::write(from.join("zig"), b"binary").unwrap();
        std::fs::write(from.join("lib").join("std").join("std.zig"), b"pub").unwrap();

        let to = temp.path().join("to");
        StdFileSystem.copy_dir(&from, &to).unwrap();

        assert_eq!(std::fs::read(to.join("zig")).unwrap(), b"binary");
        assert_eq!(
            std::fs::read(to.join("lib").join("std").join("std.zig")).unwrap(),
            b"pub"
        );
    }

    #[test]
    fn list_dir_is_sorted() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("b"), b"").unwrap();
        std::fs::write(temp.path().join("a"), b"").unwrap();

        let names: Vec<_> = StdFileSystem
            .list_dir(temp.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[test]
    fn entry_exists_sees_broken_symlink() {
        let temp = tempfile::tempdir().unwrap();
        let link = temp.path().join("zig");
        StdFileSystem
            .symlink(&temp.path().join("missing"), &link)
            .unwrap();

        assert!(!StdFileSystem.exists(&link));
        assert!(StdFileSystem.entry_exists(&link));
    }
}
