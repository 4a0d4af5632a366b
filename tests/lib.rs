//! Shared helpers for sodium-xchacha integration tests

use sodium_xchacha::{Backend, BufferPointer, ModuleConfig, WasmBackend};

/// Decode a hex string, panicking on malformed input.
pub fn decode_hex(s: &str) -> Vec<u8> {
    hex::decode(s).expect("valid hex literal")
}

/// Install a test-friendly subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Layout with a single initial page, so a few allocations force growth.
pub fn small_config() -> ModuleConfig {
    ModuleConfig {
        initial_pages: 1,
        maximum_pages: 256,
        heap_base: 1024,
    }
}

/// Fresh linear-memory backend on [`small_config`].
pub fn wasm_backend() -> WasmBackend {
    WasmBackend::with_config(&small_config()).expect("module starts")
}

/// Copy `bytes` into a new buffer on `backend`.
pub fn buffer<B: Backend>(backend: &B, bytes: &[u8]) -> B::Buffer {
    backend.transfer(bytes.to_vec()).expect("transfer")
}

/// Release every buffer in `buffers`.
pub fn free_all<P: BufferPointer>(buffers: impl IntoIterator<Item = P>) {
    for buf in buffers {
        buf.free();
    }
}
