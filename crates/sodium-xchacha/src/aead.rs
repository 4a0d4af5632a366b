//! `XChaCha20-Poly1305-IETF` constants and argument validation.
//!
//! Both backends run every AEAD call through these checks before touching
//! the cipher, so a bad argument fails identically whichever backend is
//! selected. Lengths that libsodium would silently trust (key, nonce, MAC)
//! are verified here because a handle carries its own length.

use crate::error::{AeadOp, Result, SodiumError};

/// MAC length in bytes (128-bit Poly1305 tag).
pub const ABYTES: usize = 16;

/// Key length in bytes.
pub const KEYBYTES: usize = 32;

/// Public nonce length in bytes (192-bit extended nonce).
pub const NPUBBYTES: usize = 24;

/// Secret nonce length in bytes. The construction has no secret nonce.
pub const NSECBYTES: usize = 0;

/// ChaCha20 block counter limit: 64 bytes per block, 2^32 - 2 blocks.
pub(crate) const CHACHA_MESSAGE_LIMIT: u64 = 64 * ((1u64 << 32) - 2);

/// Reject a supplied secret nonce.
pub(crate) fn reject_secret_nonce<B>(operation: AeadOp, nsec: Option<&B>) -> Result<()> {
    match nsec {
        Some(_) => Err(SodiumError::SecretNonceUnsupported { operation }),
        None => Ok(()),
    }
}

fn check_len(operation: AeadOp, what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SodiumError::InvalidLength {
            operation,
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_key_and_nonce(operation: AeadOp, npub_len: usize, k_len: usize) -> Result<()> {
    check_len(operation, "key", KEYBYTES, k_len)?;
    check_len(operation, "nonce", NPUBBYTES, npub_len)
}

fn check_message(operation: AeadOp, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(SodiumError::MessageTooLong {
            operation,
            len,
            max,
        });
    }
    Ok(())
}

fn check_destination(operation: AeadOp, required: usize, actual: usize) -> Result<()> {
    if actual < required {
        return Err(SodiumError::DestinationTooSmall {
            operation,
            required,
            actual,
        });
    }
    Ok(())
}

/// Validate a combined encryption and return the ciphertext length.
pub(crate) fn validate_encrypt(
    max: usize,
    c_len: usize,
    m_len: usize,
    npub_len: usize,
    k_len: usize,
) -> Result<usize> {
    let op = AeadOp::Encrypt;
    check_key_and_nonce(op, npub_len, k_len)?;
    check_message(op, m_len, max)?;
    let required = m_len + ABYTES;
    check_destination(op, required, c_len)?;
    Ok(required)
}

/// Validate a combined decryption and return the plaintext length.
pub(crate) fn validate_decrypt(
    max: usize,
    m_len: usize,
    c_len: usize,
    npub_len: usize,
    k_len: usize,
) -> Result<usize> {
    let op = AeadOp::Decrypt;
    check_key_and_nonce(op, npub_len, k_len)?;
    let Some(required) = c_len.checked_sub(ABYTES) else {
        return Err(SodiumError::AuthenticationFailed { operation: op });
    };
    check_message(op, required, max)?;
    check_destination(op, required, m_len)?;
    Ok(required)
}

/// Validate a detached encryption.
pub(crate) fn validate_encrypt_detached(
    max: usize,
    c_len: usize,
    mac_len: usize,
    m_len: usize,
    npub_len: usize,
    k_len: usize,
) -> Result<()> {
    let op = AeadOp::EncryptDetached;
    check_key_and_nonce(op, npub_len, k_len)?;
    check_message(op, m_len, max)?;
    check_destination(op, m_len, c_len)?;
    check_destination(op, ABYTES, mac_len)
}

/// Validate a detached decryption.
pub(crate) fn validate_decrypt_detached(
    max: usize,
    m_len: usize,
    c_len: usize,
    mac_len: usize,
    npub_len: usize,
    k_len: usize,
) -> Result<()> {
    let op = AeadOp::DecryptDetached;
    check_key_and_nonce(op, npub_len, k_len)?;
    check_len(op, "mac", ABYTES, mac_len)?;
    check_message(op, c_len, max)?;
    check_destination(op, c_len, m_len)
}
