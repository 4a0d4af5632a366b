//! The compiled libsodium module as seen by the WASM backend.
//!
//! [`SodiumModule`] is the export table the backend relies on: one linear
//! memory, `malloc`/`free`, `sodium_init`, the constant getters and the four
//! AEAD entry points. Pointers are 32-bit offsets into the memory, lengths
//! are `unsigned long long` (64-bit), statuses are C `int`s.
//!
//! [`SoftModule`] provides the table in-process on top of [`LinearMemory`]
//! and [`Heap`], so the backend can run without a WASM engine.

pub mod heap;
pub mod memory;
pub mod soft;

pub use heap::Heap;
pub use memory::{LinearMemory, MAX_PAGES, MemoryIdentity, PAGE_SIZE};
pub use soft::SoftModule;

/// Offset into module memory.
pub type Ptr = u32;

/// The null pointer.
pub const NULL: Ptr = 0;

/// Export table of a libsodium module.
///
/// All calls are synchronous. Entry points return 0 on success and a
/// negative value on failure; out-parameters (`*_p`) receive a little-endian
/// `u64` when non-null.
#[allow(clippy::too_many_arguments)]
pub trait SodiumModule: Send + Sync {
    /// Entire linear memory.
    fn memory(&self) -> &[u8];

    /// Entire linear memory, mutable.
    fn memory_mut(&mut self) -> &mut [u8];

    /// Identity of the memory's current backing storage.
    fn memory_identity(&self) -> MemoryIdentity;

    /// Initialize the library: 0 on first success, 1 if already done,
    /// negative on failure.
    fn sodium_init(&mut self) -> i32;

    /// Allocate `size` bytes; [`NULL`] on failure.
    fn malloc(&mut self, size: u32) -> Ptr;

    /// Release an allocation. Freeing [`NULL`] does nothing.
    fn free(&mut self, ptr: Ptr);

    /// `crypto_aead_xchacha20poly1305_ietf_abytes`
    fn crypto_aead_xchacha20poly1305_ietf_abytes(&self) -> i32;

    /// `crypto_aead_xchacha20poly1305_ietf_keybytes`
    fn crypto_aead_xchacha20poly1305_ietf_keybytes(&self) -> i32;

    /// `crypto_aead_xchacha20poly1305_ietf_npubbytes`
    fn crypto_aead_xchacha20poly1305_ietf_npubbytes(&self) -> i32;

    /// `crypto_aead_xchacha20poly1305_ietf_nsecbytes`
    fn crypto_aead_xchacha20poly1305_ietf_nsecbytes(&self) -> i32;

    /// `crypto_aead_xchacha20poly1305_ietf_messagebytes_max`
    ///
    /// A `size_t` on a 32-bit module; values above `i32::MAX` come back
    /// negative and must be read as unsigned.
    fn crypto_aead_xchacha20poly1305_ietf_messagebytes_max(&self) -> i32;

    /// Combined encryption.
    fn crypto_aead_xchacha20poly1305_ietf_encrypt(
        &mut self,
        c: Ptr,
        clen_p: Ptr,
        m: Ptr,
        mlen: u64,
        ad: Ptr,
        adlen: u64,
        nsec: Ptr,
        npub: Ptr,
        k: Ptr,
    ) -> i32;

    /// Combined decryption.
    fn crypto_aead_xchacha20poly1305_ietf_decrypt(
        &mut self,
        m: Ptr,
        mlen_p: Ptr,
        nsec: Ptr,
        c: Ptr,
        clen: u64,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> i32;

    /// Detached encryption.
    fn crypto_aead_xchacha20poly1305_ietf_encrypt_detached(
        &mut self,
        c: Ptr,
        mac: Ptr,
        maclen_p: Ptr,
        m: Ptr,
        mlen: u64,
        ad: Ptr,
        adlen: u64,
        nsec: Ptr,
        npub: Ptr,
        k: Ptr,
    ) -> i32;

    /// Detached decryption.
    fn crypto_aead_xchacha20poly1305_ietf_decrypt_detached(
        &mut self,
        m: Ptr,
        nsec: Ptr,
        c: Ptr,
        clen: u64,
        mac: Ptr,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> i32;
}
