//! Archive extraction for downloaded toolchains.
//!
//! Two formats are published: xz-compressed tarballs (Linux, macOS) and zip
//! files (Windows).
//!
//! The tar.xz path reads the compressed file into memory under a hard ceiling,
//! streams the decompressed tar into a temporary file in fixed-size chunks
//! (bounded by a second ceiling), and then unpacks it with the single top-level
//! wrapper directory stripped. The temporary tar is removed on every path.
//!
//! The zip path extracts entries as-is; stripping the wrapper directory is left
//! to the caller.

use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use xz2::read::XzDecoder;

use crate::errors::{Result, ZvmError};

/// Ceiling on compressed bytes held in memory.
pub const DEFAULT_MAX_COMPRESSED_BYTES: u64 = 100 * 1024 * 1024;

/// Ceiling on decompressed tar bytes written to the temporary file.
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Chunk size used when writing the decompressed tar.
const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Extracts tar.xz and zip archives with bounded resource use.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    temp_dir: PathBuf,
    max_compressed_bytes: u64,
    max_decompressed_bytes: u64,
}

impl ArchiveExtractor {
    /// Creates an extractor writing temporary tar files into `temp_dir`.
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            max_compressed_bytes: DEFAULT_MAX_COMPRESSED_BYTES,
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
        }
    }

    /// Overrides both size ceilings.
    #[cfg(test)]
    #[must_use]
    pub fn with_limits(mut self, max_compressed_bytes: u64, max_decompressed_bytes: u64) -> Self {
        self.max_compressed_bytes = max_compressed_bytes;
        self.max_decompressed_bytes = max_decompressed_bytes;
        self
    }

    /// Extracts a tar.xz archive into `out_dir`, stripping the top-level directory.
    ///
    /// # Errors
    ///
    /// Returns an `Extraction` error if the archive is corrupt, either size
    /// ceiling is exceeded, or writing fails. No temporary file survives an error.
    pub fn extract_tar_xz(&self, archive_path: &Path, out_dir: &Path) -> Result<()> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to open archive {}", archive_path.display()),
                e,
            )
        })?;
        let compressed = read_bounded(file, self.max_compressed_bytes).map_err(|e| match e {
            BoundedReadError::Exceeded => ZvmError::extraction(format!(
                "compressed archive {} exceeds the {} byte memory ceiling",
                archive_path.display(),
                self.max_compressed_bytes
            )),
            BoundedReadError::Io(e) => ZvmError::extraction_with_source(
                format!("failed to read archive {}", archive_path.display()),
                e,
            ),
        })?;

        std::fs::create_dir_all(&self.temp_dir).map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to create {}", self.temp_dir.display()),
                e,
            )
        })?;
        let mut temp_tar = tempfile::Builder::new()
            .prefix("zvm-")
            .suffix(".tar")
            .tempfile_in(&self.temp_dir)
            .map_err(|e| ZvmError::extraction_with_source("failed to create temporary tar", e))?;

        let written = self.decompress_into(&compressed, temp_tar.as_file_mut())?;
        drop(compressed);
        debug!(bytes = written, path = %temp_tar.path().display(), "decompressed tar");

        unpack_tar_stripped(temp_tar.path(), out_dir)?;

        if let Err(e) = temp_tar.close() {
            warn!(error = %e, "failed to remove temporary tar file");
        }
        Ok(())
    }

    fn decompress_into(&self, compressed: &[u8], out: &mut std::fs::File) -> Result<u64> {
        let mut decoder = XzDecoder::new(compressed);
        let mut buffer = vec![0u8; WRITE_CHUNK_SIZE];
        let mut written: u64 = 0;

        loop {
            let read = decoder.read(&mut buffer).map_err(|e| {
                ZvmError::extraction_with_source("archive is not valid xz data", e)
            })?;
            if read == 0 {
                break;
            }
            written += read as u64;
            if written > self.max_decompressed_bytes {
                return Err(ZvmError::extraction(format!(
                    "decompressed archive exceeds the {} byte ceiling",
                    self.max_decompressed_bytes
                )));
            }
            out.write_all(&buffer[..read]).map_err(|e| {
                ZvmError::extraction_with_source("failed to write temporary tar", e)
            })?;
        }

        out.flush()
            .map_err(|e| ZvmError::extraction_with_source("failed to flush temporary tar", e))?;
        Ok(written)
    }

    /// Extracts a zip archive into `out_dir` without altering its layout.
    ///
    /// # Errors
    ///
    /// Returns an `Extraction` error if the archive is not a valid zip file,
    /// contains an unsafe path, or a file cannot be written.
    pub fn extract_zip(&self, archive_path: &Path, out_dir: &Path) -> Result<()> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to open archive {}", archive_path.display()),
                e,
            )
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to read ZIP archive {}", archive_path.display()),
                e,
            )
        })?;

        create_dir(out_dir)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| {
                ZvmError::extraction_with_source(format!("failed to read archive entry {i}"), e)
            })?;

            let Some(entry_path) = entry.enclosed_name() else {
                return Err(ZvmError::extraction(format!(
                    "refusing to extract unsafe path: {}",
                    entry.name()
                )));
            };
            let output_path = out_dir.join(&entry_path);

            if entry.is_dir() {
                create_dir(&output_path)?;
                continue;
            }

            if let Some(parent) = output_path.parent() {
                create_dir(parent)?;
            }
            let mut outfile = std::fs::File::create(&output_path).map_err(|e| {
                ZvmError::extraction_with_source(
                    format!("failed to create {}", output_path.display()),
                    e,
                )
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                ZvmError::extraction_with_source(
                    format!("failed to extract {}", output_path.display()),
                    e,
                )
            })?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&output_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| {
                        ZvmError::extraction_with_source(
                            format!("failed to set permissions on {}", output_path.display()),
                            e,
                        )
                    })?;
            }
        }

        Ok(())
    }
}

enum BoundedReadError {
    Exceeded,
    Io(std::io::Error),
}

/// Reads `reader` to the end, failing as soon as more than `limit` bytes arrive.
fn read_bounded(reader: impl Read, limit: u64) -> std::result::Result<Vec<u8>, BoundedReadError> {
    let mut buffer = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buffer)
        .map_err(BoundedReadError::Io)?;
    if buffer.len() as u64 > limit {
        return Err(BoundedReadError::Exceeded);
    }
    Ok(buffer)
}

/// Unpacks a plain tar file, dropping the first path component of every entry.
fn unpack_tar_stripped(tar_path: &Path, out_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(tar_path).map_err(|e| {
        ZvmError::extraction_with_source(format!("failed to open {}", tar_path.display()), e)
    })?;
    let mut archive = tar::Archive::new(file);
    archive.set_preserve_permissions(true);

    create_dir(out_dir)?;

    let entries = archive
        .entries()
        .map_err(|e| ZvmError::extraction_with_source("failed to read tar entries", e))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| ZvmError::extraction_with_source("failed to read tar entry", e))?;
        let entry_path = entry
            .path()
            .map_err(|e| ZvmError::extraction_with_source("invalid tar entry path", e))?
            .into_owned();

        let relative = strip_wrapper(&entry_path)?;
        let Some(relative) = relative else {
            if entry.header().entry_type().is_dir() {
                continue;
            }
            return Err(ZvmError::extraction(format!(
                "expected a single wrapper directory, found top-level file {}",
                entry_path.display()
            )));
        };

        let output_path = out_dir.join(&relative);
        if entry.header().entry_type().is_dir() {
            create_dir(&output_path)?;
            continue;
        }
        if let Some(parent) = output_path.parent() {
            create_dir(parent)?;
        }
        entry.unpack(&output_path).map_err(|e| {
            ZvmError::extraction_with_source(
                format!("failed to extract {}", output_path.display()),
                e,
            )
        })?;
    }

    Ok(())
}

/// Returns the entry path without its first component, or `None` for the
/// wrapper itself.
fn strip_wrapper(entry_path: &Path) -> Result<Option<PathBuf>> {
    let mut components = entry_path.components();
    for component in entry_path.components() {
        if !matches!(component, Component::Normal(_) | Component::CurDir) {
            return Err(ZvmError::extraction(format!(
                "refusing to extract unsafe path: {}",
                entry_path.display()
            )));
        }
    }
    components.next();
    let rest: PathBuf = components
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if rest.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(rest))
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        ZvmError::extraction_with_source(format!("failed to create {}", path.display()), e)
    })
}

/// Marks a file as executable (Unix only).
///
/// # Errors
///
/// Returns an error if the permissions cannot be read or set.
#[cfg(unix)]
pub fn set_executable_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| ZvmError::io(format!("failed to get metadata: {}", path.display()), e))?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
        .map_err(|e| ZvmError::io(format!("failed to set permissions: {}", path.display()), e))
}

/// Sets executable permissions (no-op on Windows).
#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
pub fn set_executable_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::Path;

    /// Writes a tar.xz archive containing `files` (path, contents).
    pub fn write_tar_xz(archive_path: &Path, files: &[(&str, &[u8])]) {
        let file = std::fs::File::create(archive_path).expect("Should create file");
        let encoder = xz2::write::XzEncoder::new(file, 6);
        let mut builder = tar::Builder::new(encoder);

        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, path, *contents)
                .expect("Should append file");
        }

        let encoder = builder.into_inner().expect("Should finish tar");
        encoder.finish().expect("Should finish xz");
    }

    /// Writes a zip archive containing `files` (path, contents).
    pub fn write_zip(archive_path: &Path, files: &[(&str, &[u8])]) {
        let file = std::fs::File::create(archive_path).expect("Should create file");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        for (path, contents) in files {
            zip.start_file(*path, options).expect("Should start file");
            zip.write_all(contents).expect("Should write");
        }

        zip.finish().expect("Should finish");
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{write_tar_xz, write_zip};
    use super::*;

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
    }

    #[test]
    fn extract_tar_xz_strips_wrapper_directory() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("zig-linux-x86_64-0.13.0.tar.xz");
        write_tar_xz(
            &archive,
            &[
                ("zig-linux-x86_64-0.13.0/zig", b"binary content"),
                ("zig-linux-x86_64-0.13.0/lib/std/std.zig", b"pub const x = 1;"),
            ],
        );

        let tmp = temp.path().join("tmp");
        let out = temp.path().join("out");
        ArchiveExtractor::new(&tmp)
            .extract_tar_xz(&archive, &out)
            .unwrap();

        assert_eq!(std::fs::read(out.join("zig")).unwrap(), b"binary content");
        assert!(out.join("lib").join("std").join("std.zig").exists());
        assert!(!out.join("zig-linux-x86_64-0.13.0").exists());
        assert!(dir_is_empty(&tmp));
    }

    #[test]
    fn extract_tar_xz_rejects_oversized_compressed_input() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("big.tar.xz");
        let payload = vec![7u8; 64 * 1024];
        write_tar_xz(&archive, &[("wrapper/zig", &payload)]);

        let tmp = temp.path().join("tmp");
        let out = temp.path().join("out");
        let err = ArchiveExtractor::new(&tmp)
            .with_limits(16, DEFAULT_MAX_DECOMPRESSED_BYTES)
            .extract_tar_xz(&archive, &out)
            .unwrap_err();

        assert!(matches!(err, ZvmError::Extraction { .. }));
        assert!(!out.exists());
        assert!(dir_is_empty(&tmp));
    }

    #[test]
    fn extract_tar_xz_rejects_decompressed_size_over_ceiling() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("bomb.tar.xz");
        let payload = vec![0u8; 512 * 1024];
        write_tar_xz(&archive, &[("wrapper/zig", &payload)]);

        let tmp = temp.path().join("tmp");
        let out = temp.path().join("out");
        let err = ArchiveExtractor::new(&tmp)
            .with_limits(DEFAULT_MAX_COMPRESSED_BYTES, 128 * 1024)
            .extract_tar_xz(&archive, &out)
            .unwrap_err();

        assert!(err.to_string().contains("ceiling"));
        assert!(!out.exists());
        assert!(dir_is_empty(&tmp));
    }

    #[test]
    fn extract_tar_xz_rejects_corrupt_data() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("corrupt.tar.xz");
        std::fs::write(&archive, b"definitely not xz").unwrap();

        let tmp = temp.path().join("tmp");
        let err = ArchiveExtractor::new(&tmp)
            .extract_tar_xz(&archive, &temp.path().join("out"))
            .unwrap_err();

        assert!(matches!(err, ZvmError::Extraction { .. }));
        assert!(dir_is_empty(&tmp));
    }

    #[test]
    fn extract_tar_xz_rejects_top_level_files() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("flat.tar.xz");
        write_tar_xz(&archive, &[("zig", b"binary")]);

        let err = ArchiveExtractor::new(temp.path().join("tmp"))
            .extract_tar_xz(&archive, &temp.path().join("out"))
            .unwrap_err();
        assert!(err.to_string().contains("wrapper directory"));
    }

    #[test]
    fn extract_zip_keeps_layout() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("zig.zip");
        write_zip(
            &archive,
            &[
                ("zig-windows-x86_64-0.13.0/zig.exe", b"binary"),
                ("zig-windows-x86_64-0.13.0/lib/std.zig", b"std"),
            ],
        );

        let out = temp.path().join("out");
        ArchiveExtractor::new(temp.path().join("tmp"))
            .extract_zip(&archive, &out)
            .unwrap();

        assert!(out.join("zig-windows-x86_64-0.13.0").join("zig.exe").exists());
        assert!(
            out.join("zig-windows-x86_64-0.13.0")
                .join("lib")
                .join("std.zig")
                .exists()
        );
    }

    #[test]
    fn extract_zip_rejects_invalid_archive() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("broken.zip");
        std::fs::write(&archive, b"PK-but-not-really").unwrap();

        let err = ArchiveExtractor::new(temp.path().join("tmp"))
            .extract_zip(&archive, &temp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ZvmError::Extraction { .. }));
    }

    #[test]
    fn strip_wrapper_rejects_parent_components() {
        assert!(strip_wrapper(Path::new("wrapper/../../etc/passwd")).is_err());
        assert_eq!(strip_wrapper(Path::new("wrapper/")).unwrap(), None);
        assert_eq!(
            strip_wrapper(Path::new("wrapper/lib/std.zig")).unwrap(),
            Some(PathBuf::from("lib/std.zig"))
        );
    }
}
