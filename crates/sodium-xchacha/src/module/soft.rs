//! In-process libsodium module.
//!
//! Implements the [`SodiumModule`] export table over an emulated 32-bit
//! linear memory. The cipher entry points bounds-check every pointer and
//! length; an out-of-range access fails the call where a WASM engine would
//! trap.

use chacha20poly1305::{
    Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use tracing::{trace, warn};
use zeroize::Zeroizing;

use super::heap::Heap;
use super::memory::{LinearMemory, MemoryIdentity};
use super::{NULL, Ptr, SodiumModule};
use crate::aead::{ABYTES, KEYBYTES, NPUBBYTES, NSECBYTES};
use crate::config::ModuleConfig;
use crate::error::Result;

const STATUS_OK: i32 = 0;
const STATUS_FAILED: i32 = -1;

/// `SIZE_MAX - ABYTES` on a 32-bit module.
const MESSAGEBYTES_MAX: u32 = u32::MAX - ABYTES as u32;

fn status(outcome: Option<()>) -> i32 {
    match outcome {
        Some(()) => STATUS_OK,
        None => STATUS_FAILED,
    }
}

fn offset(ptr: Ptr, len: u64) -> Option<Ptr> {
    Ptr::try_from(u64::from(ptr).checked_add(len)?).ok()
}

/// libsodium export table backed by [`LinearMemory`] and [`Heap`].
pub struct SoftModule {
    memory: LinearMemory,
    heap: Heap,
    initialized: bool,
}

impl SoftModule {
    /// Build a module with the given memory layout.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidConfig`](crate::SodiumError::InvalidConfig)
    /// for an invalid layout and
    /// [`SodiumError::AllocationFailed`](crate::SodiumError::AllocationFailed)
    /// if the initial memory cannot be reserved.
    pub fn new(config: &ModuleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            memory: LinearMemory::new(config.initial_pages, config.maximum_pages)?,
            heap: Heap::new(config.heap_base),
            initialized: false,
        })
    }

    /// The module's allocator, for diagnostics.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Current memory size in pages.
    #[must_use]
    pub fn pages(&self) -> u32 {
        self.memory.pages()
    }

    fn write(&mut self, ptr: Ptr, bytes: &[u8]) -> Option<()> {
        self.memory
            .get_mut(ptr, bytes.len() as u64)?
            .copy_from_slice(bytes);
        Some(())
    }

    fn write_len(&mut self, ptr: Ptr, value: u64) -> Option<()> {
        if ptr == NULL {
            return Some(());
        }
        self.write(ptr, &value.to_le_bytes())
    }

    fn cipher(&self, npub: Ptr, k: Ptr) -> Option<(XChaCha20Poly1305, XNonce)> {
        let key = self.memory.get(k, KEYBYTES as u64)?;
        let cipher = XChaCha20Poly1305::new_from_slice(key).ok()?;
        let nonce = XNonce::clone_from_slice(self.memory.get(npub, NPUBBYTES as u64)?);
        Some((cipher, nonce))
    }

    /// Encrypt `m` and return ciphertext and MAC without touching memory.
    fn seal(
        &self,
        m: Ptr,
        mlen: u64,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> Option<(Zeroizing<Vec<u8>>, [u8; ABYTES])> {
        if mlen > u64::from(MESSAGEBYTES_MAX) {
            return None;
        }
        let (cipher, nonce) = self.cipher(npub, k)?;
        let aad = self.memory.get(ad, adlen)?;
        let mut buffer = Zeroizing::new(self.memory.get(m, mlen)?.to_vec());

        let tag = cipher
            .encrypt_in_place_detached(&nonce, aad, &mut buffer)
            .ok()?;
        let mut mac = [0u8; ABYTES];
        mac.copy_from_slice(&tag);
        Some((buffer, mac))
    }

    /// Verify and decrypt `c`, returning the plaintext without touching
    /// memory.
    #[allow(clippy::too_many_arguments)]
    fn open(
        &self,
        c: Ptr,
        clen: u64,
        mac: Ptr,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> Option<Zeroizing<Vec<u8>>> {
        let (cipher, nonce) = self.cipher(npub, k)?;
        let aad = self.memory.get(ad, adlen)?;
        let tag = Tag::clone_from_slice(self.memory.get(mac, ABYTES as u64)?);
        let mut buffer = Zeroizing::new(self.memory.get(c, clen)?.to_vec());

        cipher
            .decrypt_in_place_detached(&nonce, aad, &mut buffer, &tag)
            .ok()?;
        Some(buffer)
    }

    #[allow(clippy::too_many_arguments)]
    fn encrypt_combined(
        &mut self,
        c: Ptr,
        clen_p: Ptr,
        m: Ptr,
        mlen: u64,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> Option<()> {
        let (ciphertext, mac) = self.seal(m, mlen, ad, adlen, npub, k)?;
        let clen = mlen + ABYTES as u64;
        let out = self.memory.get_mut(c, clen)?;
        let (body, tag) = out.split_at_mut(ciphertext.len());
        body.copy_from_slice(&ciphertext);
        tag.copy_from_slice(&mac);
        self.write_len(clen_p, clen)
    }

    #[allow(clippy::too_many_arguments)]
    fn decrypt_combined(
        &mut self,
        m: Ptr,
        mlen_p: Ptr,
        c: Ptr,
        clen: u64,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> Option<()> {
        let mlen = clen.checked_sub(ABYTES as u64)?;
        let mac_ptr = offset(c, mlen)?;
        let plaintext = self.open(c, mlen, mac_ptr, ad, adlen, npub, k)?;
        self.write(m, &plaintext)?;
        self.write_len(mlen_p, mlen)
    }
}

impl SodiumModule for SoftModule {
    fn memory(&self) -> &[u8] {
        self.memory.as_slice()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.as_mut_slice()
    }

    fn memory_identity(&self) -> MemoryIdentity {
        self.memory.identity()
    }

    fn sodium_init(&mut self) -> i32 {
        if self.initialized {
            return 1;
        }
        self.initialized = true;
        0
    }

    fn malloc(&mut self, size: u32) -> Ptr {
        let ptr = self.heap.malloc(&mut self.memory, size);
        trace!(ptr, size, pages = self.memory.pages(), "malloc");
        ptr
    }

    fn free(&mut self, ptr: Ptr) {
        if ptr == NULL {
            return;
        }
        if self.heap.free(ptr) {
            trace!(ptr, "free");
        } else {
            warn!(ptr, "free of unknown pointer ignored");
        }
    }

    fn crypto_aead_xchacha20poly1305_ietf_abytes(&self) -> i32 {
        ABYTES as i32
    }

    fn crypto_aead_xchacha20poly1305_ietf_keybytes(&self) -> i32 {
        KEYBYTES as i32
    }

    fn crypto_aead_xchacha20poly1305_ietf_npubbytes(&self) -> i32 {
        NPUBBYTES as i32
    }

    fn crypto_aead_xchacha20poly1305_ietf_nsecbytes(&self) -> i32 {
        NSECBYTES as i32
    }

    fn crypto_aead_xchacha20poly1305_ietf_messagebytes_max(&self) -> i32 {
        // reinterpreted, as a wasm32 `size_t` return would be
        MESSAGEBYTES_MAX as i32
    }

    fn crypto_aead_xchacha20poly1305_ietf_encrypt(
        &mut self,
        c: Ptr,
        clen_p: Ptr,
        m: Ptr,
        mlen: u64,
        ad: Ptr,
        adlen: u64,
        _nsec: Ptr,
        npub: Ptr,
        k: Ptr,
    ) -> i32 {
        status(self.encrypt_combined(c, clen_p, m, mlen, ad, adlen, npub, k))
    }

    fn crypto_aead_xchacha20poly1305_ietf_decrypt(
        &mut self,
        m: Ptr,
        mlen_p: Ptr,
        _nsec: Ptr,
        c: Ptr,
        clen: u64,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> i32 {
        let outcome = self.decrypt_combined(m, mlen_p, c, clen, ad, adlen, npub, k);
        if outcome.is_none() {
            let _ = self.write_len(mlen_p, 0);
        }
        status(outcome)
    }

    fn crypto_aead_xchacha20poly1305_ietf_encrypt_detached(
        &mut self,
        c: Ptr,
        mac: Ptr,
        maclen_p: Ptr,
        m: Ptr,
        mlen: u64,
        ad: Ptr,
        adlen: u64,
        _nsec: Ptr,
        npub: Ptr,
        k: Ptr,
    ) -> i32 {
        let outcome = self.seal(m, mlen, ad, adlen, npub, k).and_then(|(ciphertext, tag)| {
            // both destinations must fit before either is written
            self.memory.get(mac, ABYTES as u64)?;
            self.write(c, &ciphertext)?;
            self.write(mac, &tag)?;
            self.write_len(maclen_p, ABYTES as u64)
        });
        status(outcome)
    }

    fn crypto_aead_xchacha20poly1305_ietf_decrypt_detached(
        &mut self,
        m: Ptr,
        _nsec: Ptr,
        c: Ptr,
        clen: u64,
        mac: Ptr,
        ad: Ptr,
        adlen: u64,
        npub: Ptr,
        k: Ptr,
    ) -> i32 {
        let outcome = self
            .open(c, clen, mac, ad, adlen, npub, k)
            .and_then(|plaintext| self.write(m, &plaintext));
        status(outcome)
    }
}
