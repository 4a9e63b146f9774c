//! Integrity verification for downloaded toolchain archives.
//!
//! An archive is checked against a SHA256 checksum (`.shasum` companion) and a
//! minisign signature (`.minisig` companion). Each check runs only when its
//! companion is available; a check that runs must pass.

use std::io::Read;
use std::path::Path;

use minisign_verify::{PublicKey, Signature};
use sha2::{Digest, Sha256};

use crate::errors::{Result, ZvmError};

/// Verifies that a file matches the expected SHA256 checksum.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be read, or a checksum
/// `Verification` error if the computed hash differs.
pub fn verify_checksum(file_path: &Path, expected: &str) -> Result<()> {
    let computed = compute_sha256(file_path)?;
    let expected = expected.trim().to_lowercase();

    if computed != expected {
        return Err(ZvmError::checksum_mismatch(expected, computed));
    }

    Ok(())
}

/// Computes the SHA256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(file_path).map_err(|e| {
        ZvmError::io(
            format!("failed to open file for checksum: {}", file_path.display()),
            e,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| {
            ZvmError::io(
                format!("failed to read file for checksum: {}", file_path.display()),
                e,
            )
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Extracts the hex digest from a `.shasum` document.
///
/// Accepts both the bare digest and the `sha256sum` format (`<digest>  <file>`).
#[must_use]
pub fn parse_shasum(content: &str) -> Option<String> {
    let digest = content.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_lowercase())
    } else {
        None
    }
}

/// Verifies a file against a minisign signature.
///
/// `public_key` is either the bare base64 key or the full contents of a
/// minisign `.pub` file.
///
/// # Errors
///
/// Returns a `Config` error if the public key is malformed, and a signature
/// `Verification` error if the signature cannot be decoded or does not match.
pub fn verify_minisign(file_path: &Path, signature: &str, public_key: &str) -> Result<()> {
    let public_key = public_key.trim();
    let public_key = if public_key.starts_with("untrusted comment:") {
        PublicKey::decode(public_key)
    } else {
        PublicKey::from_base64(public_key)
    }
    .map_err(|e| ZvmError::config(format!("invalid minisign public key: {e}")))?;
    let signature = Signature::decode(signature)
        .map_err(|e| ZvmError::signature_mismatch(format!("malformed signature: {e}")))?;

    let data = std::fs::read(file_path).map_err(|e| {
        ZvmError::io(
            format!("failed to read file for signature check: {}", file_path.display()),
            e,
        )
    })?;

    public_key.verify(&data, &signature, false).map_err(|e| {
        ZvmError::signature_mismatch(format!("{}: {e}", file_path.display()))
    })
}
