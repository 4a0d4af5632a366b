//! # sodium-xchacha
//!
//! `XChaCha20-Poly1305-IETF` authenticated encryption over buffers that live
//! either in host memory or in a libsodium module's linear memory.
//!
//! This crate provides:
//! - A [`BufferPointer`] contract shared by both storage models
//! - [`NativeBackend`]: host buffers, cipher in-process
//! - [`WasmBackend`]: buffers inside a relocatable 32-bit linear memory
//! - A crate-root facade bound to one backend at build time
//!
//! ## Backend Selection
//!
//! | Build | Selected backend | [`NATIVE`] | [`WASM`] |
//! |-------|------------------|------------|----------|
//! | default | [`NativeBackend`] | `true` | `false` |
//! | `--features wasm` | [`WasmBackend`] | `false` | `true` |
//!
//! ## Example
//!
//! ```
//! use sodium_xchacha::{self as sodium, BufferPointer};
//!
//! let key = sodium::transfer(vec![0x42u8; sodium::KEYBYTES])?;
//! let nonce = sodium::transfer(vec![0x24u8; sodium::NPUBBYTES])?;
//! let m = sodium::transfer(b"attack at dawn".to_vec())?;
//! let c = sodium::alloc(m.len() + sodium::ABYTES, false)?;
//!
//! sodium::encrypt(&c, &m, None, None, &nonce, &key)?;
//!
//! let out = sodium::alloc(m.len(), true)?;
//! sodium::decrypt(&out, None, &c, None, &nonce, &key)?;
//! assert_eq!(&*out.view(), b"attack at dawn");
//!
//! for buf in [key, nonce, m, c, out] {
//!     buf.free();
//! }
//! # Ok::<(), sodium_xchacha::SodiumError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod module;
pub mod native;
pub mod wasm;

use std::sync::OnceLock;

pub use aead::{ABYTES, KEYBYTES, NPUBBYTES, NSECBYTES};
pub use backend::Backend;
pub use buffer::BufferPointer;
pub use config::ModuleConfig;
pub use error::{AeadOp, Result, SodiumError};
pub use native::{NativeBackend, NativeBufferPointer};
pub use wasm::{WasmBackend, WasmBufferPointer};

/// Backend bound to the crate-root facade.
#[cfg(not(feature = "wasm"))]
pub type Selected = NativeBackend;

/// Backend bound to the crate-root facade.
#[cfg(feature = "wasm")]
pub type Selected = WasmBackend;

/// Buffer pointer type of the selected backend.
pub type Buffer = <Selected as Backend>::Buffer;

/// `true` when the native backend is selected.
pub const NATIVE: bool = Selected::NATIVE;

/// `true` when the linear-memory backend is selected.
pub const WASM: bool = Selected::WASM;

/// Maximum message length of the selected backend.
pub const MESSAGEBYTES_MAX: usize = Selected::MESSAGEBYTES_MAX;

static BACKEND: OnceLock<Selected> = OnceLock::new();

/// Initialize the selected backend once.
///
/// Later calls return the same instance. Calling this up front surfaces a
/// load failure as an error instead of the panic raised by [`backend`].
///
/// # Errors
///
/// Returns [`SodiumError::InitializationFailed`] if the backend cannot load.
pub fn init() -> Result<&'static Selected> {
    if let Some(backend) = BACKEND.get() {
        return Ok(backend);
    }
    let loaded = Selected::load()?;
    Ok(BACKEND.get_or_init(|| loaded))
}

/// The selected backend, initialized on first use.
///
/// # Panics
///
/// Panics if initialization fails. A backend that cannot load leaves the
/// process without a cipher, and no fallback is attempted.
#[must_use]
pub fn backend() -> &'static Selected {
    match init() {
        Ok(backend) => backend,
        Err(err) => panic!("{err}"),
    }
}

/// Allocate `byte_length` bytes on the selected backend.
///
/// # Errors
///
/// See [`Backend::alloc`].
pub fn alloc(byte_length: usize, zero: bool) -> Result<Buffer> {
    backend().alloc(byte_length, zero)
}

/// Hand `bytes` to the selected backend.
///
/// # Errors
///
/// See [`Backend::transfer`].
pub fn transfer(bytes: impl Into<Vec<u8>>) -> Result<Buffer> {
    backend().transfer(bytes)
}

/// Combined encryption; see [`Backend::encrypt`].
///
/// # Errors
///
/// See [`Backend::encrypt`].
pub fn encrypt(
    c: &Buffer,
    m: &Buffer,
    ad: Option<&Buffer>,
    nsec: Option<&Buffer>,
    npub: &Buffer,
    k: &Buffer,
) -> Result<usize> {
    backend().encrypt(c, m, ad, nsec, npub, k)
}

/// Combined decryption; see [`Backend::decrypt`].
///
/// # Errors
///
/// See [`Backend::decrypt`].
pub fn decrypt(
    m: &Buffer,
    nsec: Option<&Buffer>,
    c: &Buffer,
    ad: Option<&Buffer>,
    npub: &Buffer,
    k: &Buffer,
) -> Result<usize> {
    backend().decrypt(m, nsec, c, ad, npub, k)
}

/// Detached encryption; see [`Backend::encrypt_detached`].
///
/// # Errors
///
/// See [`Backend::encrypt_detached`].
pub fn encrypt_detached(
    c: &Buffer,
    mac: &Buffer,
    m: &Buffer,
    ad: Option<&Buffer>,
    nsec: Option<&Buffer>,
    npub: &Buffer,
    k: &Buffer,
) -> Result<usize> {
    backend().encrypt_detached(c, mac, m, ad, nsec, npub, k)
}

/// Detached decryption; see [`Backend::decrypt_detached`].
///
/// # Errors
///
/// See [`Backend::decrypt_detached`].
pub fn decrypt_detached(
    m: &Buffer,
    nsec: Option<&Buffer>,
    c: &Buffer,
    mac: &Buffer,
    ad: Option<&Buffer>,
    npub: &Buffer,
    k: &Buffer,
) -> Result<()> {
    backend().decrypt_detached(m, nsec, c, mac, ad, npub, k)
}
