//! Fuzz target for buffer slicing and the module heap
//!
//! Drives a sequence of alloc/transfer/subarray/free operations against the
//! linear-memory backend and checks every live buffer still reads back what
//! was written into it, across however many memory growths happen.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sodium_xchacha::{Backend, BufferPointer, ModuleConfig, WasmBackend, WasmBufferPointer};

#[derive(Debug, Arbitrary)]
enum Op {
    Alloc { len: u16 },
    Transfer { bytes: Vec<u8> },
    Free { index: u8 },
    Slice { index: u8, start: u16, end: u16 },
    Write { index: u8, byte: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let Ok(backend) = WasmBackend::with_config(&ModuleConfig {
        initial_pages: 1,
        maximum_pages: 32,
        heap_base: 1024,
    }) else {
        return;
    };

    // live owning handles with the bytes they should hold
    let mut live: Vec<(WasmBufferPointer, Vec<u8>)> = Vec::new();

    for op in ops {
        match op {
            Op::Alloc { len } => {
                if let Ok(buf) = backend.alloc(usize::from(len), true) {
                    live.push((buf, vec![0; usize::from(len)]));
                }
            }
            Op::Transfer { bytes } => {
                if let Ok(buf) = backend.transfer(bytes.clone()) {
                    live.push((buf, bytes));
                }
            }
            Op::Free { index } => {
                if !live.is_empty() {
                    let (buf, _) = live.swap_remove(usize::from(index) % live.len());
                    buf.free();
                }
            }
            Op::Slice { index, start, end } => {
                if let Some((buf, expected)) = live.get(usize::from(index) % live.len().max(1)) {
                    let (start, end) = (usize::from(start), usize::from(end));
                    match buf.subarray(start, end) {
                        Ok(sub) => {
                            assert!(start <= end && end <= expected.len());
                            assert_eq!(sub.to_vec(), &expected[start..end]);
                            assert!(!sub.is_owner());
                            sub.free();
                        }
                        Err(_) => assert!(start > end || end > expected.len()),
                    }
                }
            }
            Op::Write { index, byte } => {
                if let Some((buf, expected)) = live.get_mut(usize::from(index) % live.len().max(1)) {
                    if !expected.is_empty() {
                        buf.view_mut()[0] = byte;
                        expected[0] = byte;
                    }
                }
            }
        }

        for (buf, expected) in &live {
            assert_eq!(&*buf.view(), &expected[..]);
        }
    }

    for (buf, _) in live {
        buf.free();
    }
});
