//! Fuzz target for the AEAD bindings
//!
//! Runs arbitrary inputs through both backends: sealing must round-trip and
//! agree across backends, and opening arbitrary bytes must fail cleanly.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sodium_xchacha::{ABYTES, Backend, BufferPointer, ModuleConfig, NativeBackend, WasmBackend};

#[derive(Debug, Arbitrary)]
struct AeadInput {
    key: Vec<u8>,
    nonce: [u8; 24],
    plaintext: Vec<u8>,
    aad: Option<Vec<u8>>,
    detached: bool,
}

fn exercise<B: Backend>(backend: &B, input: &AeadInput) -> Option<Vec<u8>> {
    let key = backend.transfer(input.key.clone()).ok()?;
    let nonce = backend.transfer(input.nonce.to_vec()).ok()?;
    let ad = match &input.aad {
        Some(aad) => Some(backend.transfer(aad.clone()).ok()?),
        None => None,
    };
    let m = backend.transfer(input.plaintext.clone()).ok()?;
    let len = m.len();

    let sealed = if input.detached {
        let c = backend.alloc(len, false).ok()?;
        let mac = backend.alloc(ABYTES, false).ok()?;
        let sealed = backend
            .encrypt_detached(&c, &mac, &m, ad.as_ref(), None, &nonce, &key)
            .ok()
            .and_then(|_| {
                let out = backend.alloc(len, true).ok()?;
                backend
                    .decrypt_detached(&out, None, &c, &mac, ad.as_ref(), &nonce, &key)
                    .ok()?;
                assert_eq!(out.to_vec(), input.plaintext);
                out.free();
                Some([c.to_vec(), mac.to_vec()].concat())
            });
        c.free();
        mac.free();
        sealed
    } else {
        let c = backend.alloc(len + ABYTES, false).ok()?;
        let sealed = backend
            .encrypt(&c, &m, ad.as_ref(), None, &nonce, &key)
            .ok()
            .map(|_| c.to_vec());

        // the plaintext bytes read as a ciphertext must never verify
        let garbage = backend.alloc(len.saturating_sub(ABYTES), true).ok()?;
        let _ = backend.decrypt(&garbage, None, &m, ad.as_ref(), &nonce, &key);
        garbage.free();
        c.free();
        sealed
    };

    for buf in [Some(key), Some(nonce), ad, Some(m)].into_iter().flatten() {
        buf.free();
    }
    sealed
}

fuzz_target!(|input: AeadInput| {
    let native = NativeBackend::new();
    let Ok(wasm) = WasmBackend::with_config(&ModuleConfig {
        initial_pages: 1,
        maximum_pages: 64,
        heap_base: 1024,
    }) else {
        return;
    };

    let native_sealed = exercise(&native, &input);
    let wasm_sealed = exercise(&wasm, &input);
    assert_eq!(native_sealed, wasm_sealed);
});
