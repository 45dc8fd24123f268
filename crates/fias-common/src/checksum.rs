//! Checksum utilities for downloaded archives
//!
//! Registry archives are several gigabytes, so digests are always computed by
//! streaming the file through a fixed buffer.

use crate::error::{FiasError, Result};
use crate::types::ChecksumAlgorithm;
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// Compute the hex digest of a file on disk
pub fn compute_file_checksum(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, algorithm)
}

/// Compute the hex digest of any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256, _>(reader),
        ChecksumAlgorithm::Sha512 => digest_reader::<Sha512, _>(reader),
    }
}

fn digest_reader<D: Digest, R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against an expected hex digest (case-insensitive)
pub fn verify_file_checksum(
    path: impl AsRef<Path>,
    expected: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<()> {
    let path = path.as_ref();
    let actual = compute_file_checksum(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(FiasError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}
