// SPDX-License-Identifier: MIT
//! MD5 digest of stored block bytes

use crate::error::{AsdfError, Result};

/// Digest width stored in every block header
pub const CHECKSUM_SIZE: usize = 16;

pub type Checksum = [u8; CHECKSUM_SIZE];

/// All-zero digest written when no digest is computed
pub const NO_CHECKSUM: Checksum = [0; CHECKSUM_SIZE];

/// Whether this build can compute digests
pub fn is_available() -> bool {
    cfg!(feature = "checksum")
}

/// Digest of `data`, or all zeros when digests are unavailable
#[cfg(feature = "checksum")]
pub fn compute(data: &[u8]) -> Checksum {
    use md5::{Digest, Md5};

    let digest = Md5::digest(data);
    let mut out = NO_CHECKSUM;
    out.copy_from_slice(&digest);
    out
}

#[cfg(not(feature = "checksum"))]
pub fn compute(_data: &[u8]) -> Checksum {
    NO_CHECKSUM
}

/// Check `data` against a stored digest.
///
/// An all-zero stored digest means none was recorded and always passes, as
/// does any digest in a build without digest support.
pub fn verify(data: &[u8], expected: &Checksum) -> Result<()> {
    if *expected == NO_CHECKSUM || !is_available() {
        return Ok(());
    }
    let actual = compute(data);
    if actual != *expected {
        return Err(AsdfError::ChecksumMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}
