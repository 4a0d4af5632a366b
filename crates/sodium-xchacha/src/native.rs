//! Native backend: buffers are host memory, the cipher runs in-process.

use std::fmt;
use std::sync::Arc;

use chacha20poly1305::{
    Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use zeroize::Zeroizing;

use crate::aead::{self, ABYTES, CHACHA_MESSAGE_LIMIT};
use crate::backend::Backend;
use crate::buffer::{BufferPointer, check_subrange};
use crate::error::{AeadOp, Result, SodiumError};

/// Maximum message length on the native backend.
pub const MESSAGEBYTES_MAX: usize = if ((usize::MAX - ABYTES) as u64) < CHACHA_MESSAGE_LIMIT {
    usize::MAX - ABYTES
} else {
    CHACHA_MESSAGE_LIMIT as usize
};

/// Buffer pointer over host memory.
///
/// Clones and sub-regions share the same storage, so a write through one is
/// visible through all of them. The storage is released when the last handle
/// is dropped; [`free`](BufferPointer::free) does nothing.
#[derive(Clone)]
pub struct NativeBufferPointer {
    storage: Arc<RwLock<Vec<u8>>>,
    offset: usize,
    len: usize,
}

impl NativeBufferPointer {
    fn wrap(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            storage: Arc::new(RwLock::new(bytes)),
            offset: 0,
            len,
        }
    }

    /// Whether `self` and `other` are views of the same storage.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl fmt::Debug for NativeBufferPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBufferPointer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl BufferPointer for NativeBufferPointer {
    type View<'a> = MappedRwLockReadGuard<'a, [u8]>;
    type ViewMut<'a> = MappedRwLockWriteGuard<'a, [u8]>;

    fn len(&self) -> usize {
        self.len
    }

    fn view(&self) -> Self::View<'_> {
        let range = self.offset..self.offset + self.len;
        RwLockReadGuard::map(self.storage.read_recursive(), move |bytes| &bytes[range])
    }

    fn view_mut(&self) -> Self::ViewMut<'_> {
        let range = self.offset..self.offset + self.len;
        RwLockWriteGuard::map(self.storage.write(), move |bytes| &mut bytes[range])
    }

    fn free(self) {
        // host memory is reclaimed when the last handle drops
    }

    fn subarray(&self, start: usize, end: usize) -> Result<Self> {
        check_subrange(start, end, self.len)?;
        Ok(Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset + start,
            len: end - start,
        })
    }
}

/// Backend running the cipher directly over host memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    /// Create the native backend. It has no state to initialize.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn new_cipher(op: AeadOp, k: &NativeBufferPointer) -> Result<XChaCha20Poly1305> {
    XChaCha20Poly1305::new_from_slice(&k.view()).map_err(|_| SodiumError::from_status(op))
}

fn associated_data(ad: Option<&NativeBufferPointer>) -> Vec<u8> {
    ad.map(|ad| ad.to_vec()).unwrap_or_default()
}

/// Encrypt `buffer` in place and return the MAC.
///
/// Inputs are copied out of their handles before the caller takes the
/// destination write guard, so sources and destination may alias.
fn seal(
    op: AeadOp,
    k: &NativeBufferPointer,
    npub: &NativeBufferPointer,
    ad: Option<&NativeBufferPointer>,
    buffer: &mut [u8],
) -> Result<[u8; ABYTES]> {
    let cipher = new_cipher(op, k)?;
    let nonce = XNonce::clone_from_slice(&npub.view());
    let aad = associated_data(ad);

    let tag = cipher
        .encrypt_in_place_detached(&nonce, &aad, buffer)
        .map_err(|_| SodiumError::from_status(op))?;

    let mut mac = [0u8; ABYTES];
    mac.copy_from_slice(&tag);
    Ok(mac)
}

/// Verify `mac` and decrypt `buffer` in place.
///
/// On failure `buffer` still holds ciphertext; callers copy it into the
/// destination only on success.
fn open(
    op: AeadOp,
    k: &NativeBufferPointer,
    npub: &NativeBufferPointer,
    ad: Option<&NativeBufferPointer>,
    buffer: &mut [u8],
    mac: &[u8],
) -> Result<()> {
    let cipher = new_cipher(op, k)?;
    let nonce = XNonce::clone_from_slice(&npub.view());
    let aad = associated_data(ad);

    cipher
        .decrypt_in_place_detached(&nonce, &aad, buffer, Tag::from_slice(mac))
        .map_err(|_| SodiumError::from_status(op))
}

impl Backend for NativeBackend {
    type Buffer = NativeBufferPointer;

    const NATIVE: bool = true;
    const WASM: bool = false;
    const MESSAGEBYTES_MAX: usize = MESSAGEBYTES_MAX;

    fn load() -> Result<Self> {
        tracing::debug!(backend = "native", "backend selected");
        Ok(Self)
    }

    fn alloc(&self, byte_length: usize, _zero: bool) -> Result<NativeBufferPointer> {
        // safe Rust cannot hand out uninitialized bytes, so both paths zero
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(byte_length)
            .map_err(|_| SodiumError::AllocationFailed {
                requested: byte_length,
            })?;
        bytes.resize(byte_length, 0);
        Ok(NativeBufferPointer::wrap(bytes))
    }

    fn transfer(&self, bytes: impl Into<Vec<u8>>) -> Result<NativeBufferPointer> {
        Ok(NativeBufferPointer::wrap(bytes.into()))
    }

    fn encrypt(
        &self,
        c: &NativeBufferPointer,
        m: &NativeBufferPointer,
        ad: Option<&NativeBufferPointer>,
        nsec: Option<&NativeBufferPointer>,
        npub: &NativeBufferPointer,
        k: &NativeBufferPointer,
    ) -> Result<usize> {
        let op = AeadOp::Encrypt;
        aead::reject_secret_nonce(op, nsec)?;
        let clen = aead::validate_encrypt(MESSAGEBYTES_MAX, c.len(), m.len(), npub.len(), k.len())?;
        let mlen = m.len();

        let mut buffer = Zeroizing::new(m.to_vec());
        let mac = seal(op, k, npub, ad, &mut buffer)?;

        let mut out = c.view_mut();
        out[..mlen].copy_from_slice(&buffer);
        out[mlen..clen].copy_from_slice(&mac);
        Ok(clen)
    }

    fn decrypt(
        &self,
        m: &NativeBufferPointer,
        nsec: Option<&NativeBufferPointer>,
        c: &NativeBufferPointer,
        ad: Option<&NativeBufferPointer>,
        npub: &NativeBufferPointer,
        k: &NativeBufferPointer,
    ) -> Result<usize> {
        let op = AeadOp::Decrypt;
        aead::reject_secret_nonce(op, nsec)?;
        let mlen = aead::validate_decrypt(MESSAGEBYTES_MAX, m.len(), c.len(), npub.len(), k.len())?;

        let mut buffer = Zeroizing::new(c.to_vec());
        let (body, mac) = buffer.split_at_mut(mlen);
        open(op, k, npub, ad, body, mac)?;

        m.view_mut()[..mlen].copy_from_slice(body);
        Ok(mlen)
    }

    fn encrypt_detached(
        &self,
        c: &NativeBufferPointer,
        mac: &NativeBufferPointer,
        m: &NativeBufferPointer,
        ad: Option<&NativeBufferPointer>,
        nsec: Option<&NativeBufferPointer>,
        npub: &NativeBufferPointer,
        k: &NativeBufferPointer,
    ) -> Result<usize> {
        let op = AeadOp::EncryptDetached;
        aead::reject_secret_nonce(op, nsec)?;
        aead::validate_encrypt_detached(
            MESSAGEBYTES_MAX,
            c.len(),
            mac.len(),
            m.len(),
            npub.len(),
            k.len(),
        )?;
        let mlen = m.len();

        let mut buffer = Zeroizing::new(m.to_vec());
        let tag = seal(op, k, npub, ad, &mut buffer)?;

        c.view_mut()[..mlen].copy_from_slice(&buffer);
        mac.view_mut()[..ABYTES].copy_from_slice(&tag);
        Ok(ABYTES)
    }

    fn decrypt_detached(
        &self,
        m: &NativeBufferPointer,
        nsec: Option<&NativeBufferPointer>,
        c: &NativeBufferPointer,
        mac: &NativeBufferPointer,
        ad: Option<&NativeBufferPointer>,
        npub: &NativeBufferPointer,
        k: &NativeBufferPointer,
    ) -> Result<()> {
        let op = AeadOp::DecryptDetached;
        aead::reject_secret_nonce(op, nsec)?;
        aead::validate_decrypt_detached(
            MESSAGEBYTES_MAX,
            m.len(),
            c.len(),
            mac.len(),
            npub.len(),
            k.len(),
        )?;
        let clen = c.len();

        let tag = mac.to_vec();
        let mut buffer = Zeroizing::new(c.to_vec());
        open(op, k, npub, ad, &mut buffer, &tag)?;

        m.view_mut()[..clen].copy_from_slice(&buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::{KEYBYTES, NPUBBYTES};

    fn setup() -> (NativeBackend, NativeBufferPointer, NativeBufferPointer) {
        let backend = NativeBackend::new();
        let key = backend.transfer(vec![0x42u8; KEYBYTES]).unwrap();
        let nonce = backend.transfer(vec![0x24u8; NPUBBYTES]).unwrap();
        (backend, key, nonce)
    }

    #[test]
    fn test_flags() {
        assert!(NativeBackend::NATIVE);
        assert!(!NativeBackend::WASM);
    }

    #[test]
    fn test_message_limit_is_chacha_bound_on_64_bit() {
        if usize::BITS == 64 {
            assert_eq!(MESSAGEBYTES_MAX as u64, CHACHA_MESSAGE_LIMIT);
        }
    }

    #[test]
    fn test_alloc_without_zero_has_requested_length() {
        let backend = NativeBackend::new();
        let buf = backend.alloc(100, false).unwrap();
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.view().len(), 100);
    }

    #[test]
    fn test_transfer_wraps_without_copy() {
        let backend = NativeBackend::new();
        let buf = backend.transfer(vec![1u8, 2, 3, 4]).unwrap();
        let alias = buf.clone();

        buf.view_mut()[0] = 9;
        assert_eq!(&*alias.view(), &[9, 2, 3, 4]);
        assert!(buf.shares_storage_with(&alias));
    }

    #[test]
    fn test_subarray_shares_storage() {
        let backend = NativeBackend::new();
        let buf = backend.transfer((0u8..10).collect::<Vec<_>>()).unwrap();
        let sub = buf.subarray(2, 6).unwrap();
        assert_eq!(&*sub.view(), &[2, 3, 4, 5]);
        assert!(sub.shares_storage_with(&buf));

        sub.view_mut()[0] = 0xFF;
        assert_eq!(buf.view()[2], 0xFF);

        let nested = sub.subarray(1, 3).unwrap();
        assert_eq!(&*nested.view(), &[3, 4]);
    }

    #[test]
    fn test_free_is_noop() {
        let backend = NativeBackend::new();
        let buf = backend.transfer(vec![7u8; 8]).unwrap();
        let alias = buf.clone();
        buf.free();
        assert_eq!(&*alias.view(), &[7u8; 8]);
    }

    #[test]
    fn test_several_views_at_once() {
        let backend = NativeBackend::new();
        let buf = backend.transfer(vec![5u8; 8]).unwrap();
        let a = buf.view();
        let b = buf.subarray(0, 4).unwrap();
        let b = b.view();
        assert_eq!(a[0], b[0]);
    }

    #[test]
    fn test_encrypt_in_place() {
        let (backend, key, nonce) = setup();
        let plaintext = b"in-place message";
        let mut storage = plaintext.to_vec();
        storage.resize(plaintext.len() + ABYTES, 0);
        let buf = backend.transfer(storage).unwrap();
        let m = buf.subarray(0, plaintext.len()).unwrap();

        let written = backend.encrypt(&buf, &m, None, None, &nonce, &key).unwrap();
        assert_eq!(written, plaintext.len() + ABYTES);
        assert_ne!(&buf.view()[..plaintext.len()], plaintext);

        let out = backend.alloc(plaintext.len(), true).unwrap();
        let n = backend.decrypt(&out, None, &buf, None, &nonce, &key).unwrap();
        assert_eq!(n, plaintext.len());
        assert_eq!(&*out.view(), plaintext);
    }

    #[test]
    fn test_decrypt_failure_leaves_destination_untouched() {
        let (backend, key, nonce) = setup();
        let m = backend.transfer(b"hello".to_vec()).unwrap();
        let c = backend.alloc(m.len() + ABYTES, true).unwrap();
        backend.encrypt(&c, &m, None, None, &nonce, &key).unwrap();
        c.view_mut()[m.len()] ^= 0x01;

        let out = backend.transfer(vec![0xAAu8; 5]).unwrap();
        let err = backend
            .decrypt(&out, None, &c, None, &nonce, &key)
            .unwrap_err();
        assert!(err.is_authentication_failure());
        assert_eq!(&*out.view(), &[0xAAu8; 5]);
    }

    #[test]
    fn test_detached_roundtrip() {
        let (backend, key, nonce) = setup();
        let ad = backend.transfer(b"header".to_vec()).unwrap();
        let m = backend.transfer(b"detached payload".to_vec()).unwrap();
        let c = backend.alloc(m.len(), true).unwrap();
        let mac = backend.alloc(ABYTES, true).unwrap();

        let maclen = backend
            .encrypt_detached(&c, &mac, &m, Some(&ad), None, &nonce, &key)
            .unwrap();
        assert_eq!(maclen, ABYTES);

        let out = backend.alloc(m.len(), true).unwrap();
        backend
            .decrypt_detached(&out, None, &c, &mac, Some(&ad), &nonce, &key)
            .unwrap();
        assert_eq!(out.to_vec(), m.to_vec());

        // missing associated data must not verify
        assert!(
            backend
                .decrypt_detached(&out, None, &c, &mac, None, &nonce, &key)
                .is_err()
        );
    }

    #[test]
    fn test_secret_nonce_rejected() {
        let (backend, key, nonce) = setup();
        let m = backend.alloc(4, true).unwrap();
        let c = backend.alloc(4 + ABYTES, true).unwrap();
        let nsec = backend.alloc(0, true).unwrap();
        let err = backend
            .encrypt(&c, &m, None, Some(&nsec), &nonce, &key)
            .unwrap_err();
        assert!(matches!(err, SodiumError::SecretNonceUnsupported { .. }));
    }
}
