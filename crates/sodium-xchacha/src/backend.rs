//! The contract both backends implement.

use crate::buffer::BufferPointer;
use crate::error::Result;

/// An execution backend for `XChaCha20-Poly1305-IETF`.
///
/// Argument order of the AEAD entry points follows libsodium. `nsec` exists
/// only for signature parity and must be `None`; `ad: None` means no
/// associated data.
#[allow(clippy::too_many_arguments)]
pub trait Backend: Sized {
    /// Buffer handle type of this backend.
    type Buffer: BufferPointer;

    /// `true` for the native backend.
    const NATIVE: bool;

    /// `true` for the linear-memory backend.
    const WASM: bool;

    /// Maximum message length accepted by this backend.
    const MESSAGEBYTES_MAX: usize;

    /// Bring the backend up.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InitializationFailed`](crate::SodiumError::InitializationFailed)
    /// if the underlying module cannot start.
    fn load() -> Result<Self>;

    /// Allocate `byte_length` bytes, zeroed if `zero` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::AllocationFailed`](crate::SodiumError::AllocationFailed)
    /// if the backing store cannot satisfy the request.
    fn alloc(&self, byte_length: usize, zero: bool) -> Result<Self::Buffer>;

    /// Hand `bytes` over to the backend.
    ///
    /// The native backend wraps the vector without copying; the WASM backend
    /// copies it into module memory.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::AllocationFailed`](crate::SodiumError::AllocationFailed)
    /// if module memory is exhausted.
    fn transfer(&self, bytes: impl Into<Vec<u8>>) -> Result<Self::Buffer>;

    /// Combined encryption of `m` into `c` (ciphertext followed by MAC).
    ///
    /// Returns the number of bytes written, `m.len() + ABYTES`.
    ///
    /// # Errors
    ///
    /// Fails on argument validation or if the cipher reports an error.
    fn encrypt(
        &self,
        c: &Self::Buffer,
        m: &Self::Buffer,
        ad: Option<&Self::Buffer>,
        nsec: Option<&Self::Buffer>,
        npub: &Self::Buffer,
        k: &Self::Buffer,
    ) -> Result<usize>;

    /// Combined decryption of `c` into `m`.
    ///
    /// Returns the plaintext length, `c.len() - ABYTES`.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::AuthenticationFailed`](crate::SodiumError::AuthenticationFailed)
    /// if the MAC does not verify or `c` is shorter than the MAC. `m` is left
    /// untouched on failure.
    fn decrypt(
        &self,
        m: &Self::Buffer,
        nsec: Option<&Self::Buffer>,
        c: &Self::Buffer,
        ad: Option<&Self::Buffer>,
        npub: &Self::Buffer,
        k: &Self::Buffer,
    ) -> Result<usize>;

    /// Detached encryption: ciphertext into `c`, MAC into `mac`.
    ///
    /// Returns the MAC length.
    ///
    /// # Errors
    ///
    /// Fails on argument validation or if the cipher reports an error.
    fn encrypt_detached(
        &self,
        c: &Self::Buffer,
        mac: &Self::Buffer,
        m: &Self::Buffer,
        ad: Option<&Self::Buffer>,
        nsec: Option<&Self::Buffer>,
        npub: &Self::Buffer,
        k: &Self::Buffer,
    ) -> Result<usize>;

    /// Detached decryption of `c` with `mac` into `m`.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::AuthenticationFailed`](crate::SodiumError::AuthenticationFailed)
    /// on MAC mismatch. `m` is left untouched on failure.
    fn decrypt_detached(
        &self,
        m: &Self::Buffer,
        nsec: Option<&Self::Buffer>,
        c: &Self::Buffer,
        mac: &Self::Buffer,
        ad: Option<&Self::Buffer>,
        npub: &Self::Buffer,
        k: &Self::Buffer,
    ) -> Result<()>;
}
