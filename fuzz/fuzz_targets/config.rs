//! Fuzz target for module configuration parsing
//!
//! Arbitrary TOML must either be rejected or yield a layout the backend can
//! start on.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sodium_xchacha::{ModuleConfig, WasmBackend};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = ModuleConfig::from_toml_str(text) else {
        return;
    };

    // keep the fuzzer from reserving gigabytes
    if config.initial_pages > 64 {
        return;
    }
    assert!(WasmBackend::with_config(&config).is_ok());
});
