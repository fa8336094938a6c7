//! Distribution archive extraction.
//!
//! Distribution sets ship as xz-compressed tarballs (`*.txz`). An archive is
//! decompressed in full to a temporary file first so its entries can be
//! counted before anything is written to the target, which gives progress
//! a fixed denominator.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use jmanager_core::error::{JailError, Result};
use tar::{Archive, EntryType};
use xz2::read::XzDecoder;

/// Progress of one archive extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractProgress<'a> {
    /// Archive file stem, e.g. `base`.
    pub label: &'a str,
    pub entries_done: u64,
    pub entries_total: u64,
}

/// Extract an xz-compressed tarball into `target_dir`.
///
/// Permissions, mtimes and extended attributes are preserved and existing
/// files are overwritten. `progress` runs after every entry; an error from
/// it stops the extraction and is returned as is. Entries already written
/// stay on disk.
///
/// Returns the number of entries extracted.
///
/// # Errors
///
/// - `Archive` if the file is missing, is not valid xz, or holds a corrupt
///   tar stream
/// - `Io` if the target (or the temporary file) cannot be written
pub fn extract_archive(
    archive_path: &Path,
    target_dir: &Path,
    progress: &mut dyn FnMut(&ExtractProgress<'_>) -> Result<()>,
) -> Result<u64> {
    if !archive_path.is_file() {
        return Err(JailError::archive(archive_path, "archive file not found"));
    }

    std::fs::create_dir_all(target_dir)?;
    let target_dir = target_dir.canonicalize()?;

    let label = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut tarball = decompress(archive_path)?;

    let entries_total = count_entries(archive_path, tarball.as_file_mut())?;
    tracing::debug!(
        archive = %archive_path.display(),
        entries = entries_total,
        "Decompressed archive"
    );

    tarball.as_file_mut().seek(SeekFrom::Start(0))?;
    let mut archive = Archive::new(BufReader::new(tarball.as_file()));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(true);
    archive.set_overwrite(true);

    // Malformed entries surface as data/input errors; anything else came
    // from the destination filesystem.
    let unpack_error = |e: std::io::Error| -> JailError {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::InvalidData
            | ErrorKind::InvalidInput
            | ErrorKind::UnexpectedEof
            | ErrorKind::Other => {
                JailError::archive(archive_path, format!("failed to unpack: {}", e))
            }
            _ => JailError::Io(e),
        }
    };

    let mut entries_done = 0u64;
    // Directories are finished last so read-only modes do not block their
    // contents.
    let mut directories = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| JailError::archive(archive_path, format!("invalid tar stream: {}", e)))?;
    for entry in entries {
        let mut entry = entry
            .map_err(|e| JailError::archive(archive_path, format!("invalid tar entry: {}", e)))?;
        if entry.header().entry_type() == EntryType::Directory {
            directories.push(entry);
            continue;
        }
        entry.unpack_in(&target_dir).map_err(unpack_error)?;
        entries_done += 1;
        progress(&ExtractProgress {
            label: &label,
            entries_done,
            entries_total,
        })?;
    }
    for mut directory in directories {
        directory.unpack_in(&target_dir).map_err(unpack_error)?;
        entries_done += 1;
        progress(&ExtractProgress {
            label: &label,
            entries_done,
            entries_total,
        })?;
    }

    tracing::info!(
        archive = %archive_path.display(),
        target = %target_dir.display(),
        entries = entries_done,
        "Extracted archive"
    );

    Ok(entries_done)
}

/// xz-decode into a temporary file beside the archive, removed on drop.
fn decompress(archive_path: &Path) -> Result<tempfile::NamedTempFile> {
    let file = File::open(archive_path)
        .map_err(|e| JailError::archive(archive_path, format!("failed to open: {}", e)))?;
    let mut decoder = XzDecoder::new(BufReader::new(file));

    let dir = archive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tarball = tempfile::Builder::new()
        .prefix(".jmanager-")
        .suffix(".tar")
        .tempfile_in(dir)?;

    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = decoder.read(&mut buffer).map_err(|e| {
            JailError::archive(archive_path, format!("failed to decompress: {}", e))
        })?;
        if read == 0 {
            break;
        }
        tarball.write_all(&buffer[..read])?;
    }
    tarball.flush()?;

    Ok(tarball)
}

fn count_entries(archive_path: &Path, tarball: &mut File) -> Result<u64> {
    tarball.seek(SeekFrom::Start(0))?;
    let mut archive = Archive::new(BufReader::new(tarball));
    let entries = archive
        .entries()
        .map_err(|e| JailError::archive(archive_path, format!("invalid tar stream: {}", e)))?;

    let mut count = 0u64;
    for entry in entries {
        entry.map_err(|e| JailError::archive(archive_path, format!("invalid tar entry: {}", e)))?;
        count += 1;
    }
    Ok(count)
}

/// Recursively clear BSD file flags (`chflags -R 0`) under `path`.
///
/// Base systems carry `schg` files that cannot be overwritten while the flag
/// is set. Symlinks are not followed. A missing path is not an error.
#[cfg(target_os = "freebsd")]
pub fn clear_immutable_flags(path: &Path) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    fn clear(path: &Path) -> Result<()> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
            JailError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        // SAFETY: c_path is a valid NUL-terminated string for the call.
        if unsafe { libc::lchflags(c_path.as_ptr(), 0) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if std::fs::symlink_metadata(path)?.is_dir() {
            for entry in std::fs::read_dir(path)? {
                clear(&entry?.path())?;
            }
        }
        Ok(())
    }

    if std::fs::symlink_metadata(path).is_err() {
        return Ok(());
    }
    clear(path)?;
    tracing::debug!(path = %path.display(), "Cleared file flags");
    Ok(())
}

/// Recursively clear BSD file flags. File flags only exist on FreeBSD.
#[cfg(not(target_os = "freebsd"))]
pub fn clear_immutable_flags(path: &Path) -> Result<()> {
    tracing::trace!(path = %path.display(), "File flags unsupported on this platform");
    Ok(())
}
