//! Best-effort secure file deletion
//!
//! The file is renamed to a random name in the same directory, overwritten
//! with random bytes for a number of passes (each flushed to disk), then
//! unlinked. On journaling and copy-on-write filesystems and on SSDs the
//! original blocks may survive; this is best-effort only.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use mmdrez_core::{MmdrezError, MmdrezResult};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use zeroize::Zeroizing;

/// Overwrite buffers smaller than this are rounded up.
pub const MIN_BUFFER_SIZE: usize = 4096;

/// Length of the random name the file is renamed to before overwriting.
const RANDOM_NAME_LEN: usize = 16;

/// Wipe parameters
#[derive(Debug, Clone)]
pub struct WipeOptions {
    /// Overwrite passes (default: 3, minimum 1)
    pub passes: u32,
    /// Overwrite buffer size in bytes (default: 64 KiB, minimum 4 KiB)
    pub buffer_size: usize,
}

impl Default for WipeOptions {
    fn default() -> Self {
        Self {
            passes: 3,
            buffer_size: 64 * 1024,
        }
    }
}

impl WipeOptions {
    /// Clamp out-of-range values to the minimums.
    pub fn normalized(&self) -> Self {
        Self {
            passes: self.passes.max(1),
            buffer_size: self.buffer_size.max(MIN_BUFFER_SIZE),
        }
    }
}

/// Securely delete `path`.
///
/// A path that does not exist is a no-op. Directories and other non-regular
/// files are rejected. Failing to rename is an error and leaves the file in
/// place; failures while overwriting or removing are logged and ignored.
pub fn wipe_file(path: &Path, options: &WipeOptions) -> MmdrezResult<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "wipe: nothing to do");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(MmdrezError::invalid_argument(format!(
            "not a regular file: {}",
            path.display()
        )));
    }

    wipe_renamed(path, &random_sibling(path), meta.len(), &options.normalized())
}

/// Rename `path` to `renamed`, overwrite, then remove. `len` is the size
/// captured before the rename.
fn wipe_renamed(
    path: &Path,
    renamed: &Path,
    len: u64,
    options: &WipeOptions,
) -> MmdrezResult<()> {
    std::fs::rename(path, renamed)?;

    match OpenOptions::new().write(true).open(renamed) {
        Ok(mut file) => {
            let (passes, buffer_size) = (options.passes, options.buffer_size);
            if let Err(e) = overwrite_passes(&mut file, len, passes, buffer_size) {
                tracing::warn!(path = %renamed.display(), "wipe: overwrite failed: {e}");
            }
        }
        Err(e) => tracing::warn!(path = %renamed.display(), "wipe: open failed: {e}"),
    }

    if let Err(e) = std::fs::remove_file(renamed) {
        tracing::warn!(path = %renamed.display(), "wipe: remove failed: {e}");
    }

    tracing::info!(
        path = %path.display(),
        bytes = len,
        passes = options.passes,
        "file wiped"
    );
    Ok(())
}

/// Overwrite the first `len` bytes of `file` with random data `passes` times,
/// syncing to disk after each pass.
pub(crate) fn overwrite_passes(
    file: &mut File,
    len: u64,
    passes: u32,
    buffer_size: usize,
) -> std::io::Result<()> {
    let mut buf = Zeroizing::new(vec![0u8; buffer_size]);
    let mut rng = rand::thread_rng();

    for _ in 0..passes {
        file.seek(SeekFrom::Start(0))?;
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            rng.fill_bytes(&mut buf[..n]);
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        file.flush()?;
        file.sync_all()?;
    }
    Ok(())
}

fn random_sibling(path: &Path) -> PathBuf {
    let name: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_NAME_LEN)
        .map(char::from)
        .collect();
    path.with_file_name(name)
}
