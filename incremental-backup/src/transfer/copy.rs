//! Local file copy with timestamp preservation.
//!
//! Content goes to a hidden staging file next to the target, gets the
//! source's permissions, access and modification times, and is then renamed
//! into place. An interrupted copy never leaves a truncated file under the
//! real name. The staging name is unique per copy and is created exclusively,
//! so it can never replace another file of the destination tree.

use filetime::{set_file_times, FileTime};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Attempts at finding an unused staging name before giving up
const STAGING_ATTEMPTS: usize = 8;

/// Copy `source` to `destination`, creating parent directories.
///
/// Returns the number of bytes copied.
pub fn copy_file(source: &Path, destination: &Path) -> io::Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut input = File::open(source)?;
    let metadata = input.metadata()?;
    let (staging, mut output) = create_staging(destination)?;

    let result = (|| {
        let bytes = io::copy(&mut input, &mut output)?;
        output.sync_all()?;
        drop(output);

        fs::set_permissions(&staging, metadata.permissions())?;
        let accessed = FileTime::from_last_access_time(&metadata);
        let modified = FileTime::from_last_modification_time(&metadata);
        set_file_times(&staging, accessed, modified)?;

        fs::rename(&staging, destination)?;
        Ok(bytes)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }

    result
}

/// Create a fresh `.<name>.<uuid>.partial` file beside `destination`.
fn create_staging(destination: &Path) -> io::Result<(PathBuf, File)> {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for _ in 0..STAGING_ATTEMPTS {
        let path = destination.with_file_name(format!(".{}.{}.partial", name, Uuid::new_v4().simple()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free staging name next to {}", destination.display()),
    ))
}
