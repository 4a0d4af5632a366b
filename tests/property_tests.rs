//! Property-based tests for sodium-xchacha
//!
//! Uses proptest to check buffer and AEAD invariants on both backends.

use proptest::prelude::*;
use sodium_integration_tests::{buffer, free_all, wasm_backend};
use sodium_xchacha::{
    ABYTES, Backend, BufferPointer, KEYBYTES, NPUBBYTES, NativeBackend, SodiumError, WasmBackend,
};

fn roundtrip<B: Backend>(
    backend: &B,
    key: &[u8],
    nonce: &[u8],
    ad: &[u8],
    plaintext: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let key = buffer(backend, key);
    let nonce = buffer(backend, nonce);
    let ad = buffer(backend, ad);
    let m = buffer(backend, plaintext);
    let c = backend.alloc(plaintext.len() + ABYTES, false).unwrap();
    let out = backend.alloc(plaintext.len(), true).unwrap();

    backend.encrypt(&c, &m, Some(&ad), None, &nonce, &key).unwrap();
    backend.decrypt(&out, None, &c, Some(&ad), &nonce, &key).unwrap();
    let result = (c.to_vec(), out.to_vec());

    free_all([key, nonce, ad, m, c, out]);
    result
}

fn detached_roundtrip<B: Backend>(
    backend: &B,
    key: &[u8],
    nonce: &[u8],
    ad: &[u8],
    plaintext: &[u8],
) -> Vec<u8> {
    let key = buffer(backend, key);
    let nonce = buffer(backend, nonce);
    let ad = buffer(backend, ad);
    let m = buffer(backend, plaintext);
    let c = backend.alloc(plaintext.len(), false).unwrap();
    let mac = backend.alloc(ABYTES, false).unwrap();
    let out = backend.alloc(plaintext.len(), true).unwrap();

    backend
        .encrypt_detached(&c, &mac, &m, Some(&ad), None, &nonce, &key)
        .unwrap();
    backend
        .decrypt_detached(&out, None, &c, &mac, Some(&ad), &nonce, &key)
        .unwrap();
    let result = out.to_vec();

    free_all([key, nonce, ad, m, c, mac, out]);
    result
}

/// Flip one bit of the MAC and check decryption fails without writing.
fn mac_bit_flip<B: Backend>(backend: &B, plaintext: &[u8], bit: usize) -> bool {
    let key = buffer(backend, &[0x11; KEYBYTES]);
    let nonce = buffer(backend, &[0x22; NPUBBYTES]);
    let m = buffer(backend, plaintext);
    let c = backend.alloc(plaintext.len() + ABYTES, false).unwrap();
    backend.encrypt(&c, &m, None, None, &nonce, &key).unwrap();

    c.view_mut()[plaintext.len() + bit / 8] ^= 1 << (bit % 8);

    let out = backend.transfer(vec![0x77; plaintext.len()]).unwrap();
    let failed = matches!(
        backend.decrypt(&out, None, &c, None, &nonce, &key),
        Err(SodiumError::AuthenticationFailed { .. })
    );
    let untouched = out.view().iter().all(|&b| b == 0x77);

    free_all([key, nonce, m, c, out]);
    failed && untouched
}

fn subarray_matches_slice<B: Backend>(backend: &B, bytes: &[u8], start: usize, end: usize) {
    let buf = buffer(backend, bytes);
    match buf.subarray(start, end) {
        Ok(sub) => {
            assert!(start <= end && end <= bytes.len());
            assert_eq!(sub.to_vec(), &bytes[start..end]);
            sub.free();
        }
        Err(SodiumError::InvalidRange { .. }) => assert!(start > end),
        Err(SodiumError::OutOfBounds { .. }) => assert!(start <= end && end > bytes.len()),
        Err(other) => panic!("unexpected error: {other}"),
    }
    buf.free();
}

fn wasm() -> WasmBackend {
    wasm_backend()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Decrypt(Encrypt(P)) == P on both backends, which produce identical
    /// ciphertext
    #[test]
    fn combined_roundtrip(
        key in prop::array::uniform32(any::<u8>()),
        nonce in prop::collection::vec(any::<u8>(), NPUBBYTES),
        ad in prop::collection::vec(any::<u8>(), 0..64),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let (native_c, native_p) = roundtrip(&NativeBackend::new(), &key, &nonce, &ad, &plaintext);
        let (wasm_c, wasm_p) = roundtrip(&wasm(), &key, &nonce, &ad, &plaintext);

        prop_assert_eq!(&native_p, &plaintext);
        prop_assert_eq!(&wasm_p, &plaintext);
        prop_assert_eq!(native_c, wasm_c);
    }

    /// Detached round trip recovers the plaintext
    #[test]
    fn detached_roundtrip_recovers(
        key in prop::array::uniform32(any::<u8>()),
        nonce in prop::collection::vec(any::<u8>(), NPUBBYTES),
        ad in prop::collection::vec(any::<u8>(), 0..64),
        plaintext in prop::collection::vec(any::<u8>(), 0..1024),
    ) {
        prop_assert_eq!(
            detached_roundtrip(&NativeBackend::new(), &key, &nonce, &ad, &plaintext),
            plaintext.clone()
        );
        prop_assert_eq!(
            detached_roundtrip(&wasm(), &key, &nonce, &ad, &plaintext),
            plaintext
        );
    }

    /// Any single-bit MAC change is rejected and leaves the destination alone
    #[test]
    fn mac_tamper_detected(
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
        bit in 0usize..(ABYTES * 8),
    ) {
        prop_assert!(mac_bit_flip(&NativeBackend::new(), &plaintext, bit));
        prop_assert!(mac_bit_flip(&wasm(), &plaintext, bit));
    }

    /// subarray agrees with slice indexing and reports the right error
    #[test]
    fn subarray_agrees_with_slicing(
        bytes in prop::collection::vec(any::<u8>(), 0..128),
        start in 0usize..160,
        end in 0usize..160,
    ) {
        subarray_matches_slice(&NativeBackend::new(), &bytes, start, end);
        subarray_matches_slice(&wasm(), &bytes, start, end);
    }

    /// alloc(L, true) is L zero bytes
    #[test]
    fn alloc_zeroed_is_zero(len in 0usize..4096) {
        let native = NativeBackend::new().alloc(len, true).unwrap();
        prop_assert_eq!(native.len(), len);
        prop_assert!(native.view().iter().all(|&b| b == 0));

        let backend = wasm();
        // dirty the heap first so reuse is exercised
        backend.transfer(vec![0xFF; len]).unwrap().free();
        let managed = backend.alloc(len, true).unwrap();
        prop_assert_eq!(managed.len(), len);
        prop_assert!(managed.view().iter().all(|&b| b == 0));
        managed.free();
    }
}
