//! Content fingerprints.
//!
//! A fingerprint is the MD5 digest of a file's bytes, hex encoded. Files are
//! read in fixed 4 KiB chunks so memory use does not depend on file size.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size for hashing
pub const HASH_CHUNK_SIZE: usize = 4096;

/// Fingerprint of zero bytes of input
pub const EMPTY_FINGERPRINT: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Compute the fingerprint of the file at `path`.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    fingerprint_reader(file)
}

/// Compute the fingerprint of everything `reader` yields.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = [0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
