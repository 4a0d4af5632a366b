//! Performance benchmarks for sodium-xchacha.
//!
//! Run with: `cargo bench -p sodium-xchacha`
//!
//! Both backends are measured in the same run, independent of the facade
//! selection, so the cost of going through linear memory is directly visible.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::RngCore;
use rand_core::OsRng;
use sodium_xchacha::{
    ABYTES, Backend, BufferPointer, KEYBYTES, ModuleConfig, NPUBBYTES, NativeBackend, WasmBackend,
};

const SIZES: [usize; 5] = [64, 1024, 4096, 16384, 65536];

fn wasm_backend() -> WasmBackend {
    WasmBackend::with_config(&ModuleConfig::default()).unwrap()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn bench_encrypt<B: Backend>(c: &mut Criterion, name: &str, backend: &B) {
    let mut group = c.benchmark_group(format!("{name}/encrypt"));

    let key = backend.transfer(random_bytes(KEYBYTES)).unwrap();
    let nonce = backend.transfer(random_bytes(NPUBBYTES)).unwrap();
    let ad = backend.transfer(b"additional data".to_vec()).unwrap();

    for size in SIZES {
        let m = backend.transfer(vec![0xAA; size]).unwrap();
        let out = backend.alloc(size + ABYTES, false).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                backend
                    .encrypt(
                        black_box(&out),
                        black_box(&m),
                        Some(&ad),
                        None,
                        &nonce,
                        &key,
                    )
                    .unwrap()
            })
        });

        m.free();
        out.free();
    }

    group.finish();
}

fn bench_decrypt<B: Backend>(c: &mut Criterion, name: &str, backend: &B) {
    let mut group = c.benchmark_group(format!("{name}/decrypt"));

    let key = backend.transfer(random_bytes(KEYBYTES)).unwrap();
    let nonce = backend.transfer(random_bytes(NPUBBYTES)).unwrap();
    let ad = backend.transfer(b"additional data".to_vec()).unwrap();

    for size in SIZES {
        let m = backend.transfer(vec![0xAA; size]).unwrap();
        let sealed = backend.alloc(size + ABYTES, false).unwrap();
        backend
            .encrypt(&sealed, &m, Some(&ad), None, &nonce, &key)
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                backend
                    .decrypt(black_box(&m), None, black_box(&sealed), Some(&ad), &nonce, &key)
                    .unwrap()
            })
        });

        m.free();
        sealed.free();
    }

    group.finish();
}

fn bench_alloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free");
    let native = NativeBackend::new();
    let wasm = wasm_backend();

    group.bench_function("native", |b| {
        b.iter(|| native.alloc(black_box(4096), true).unwrap().free())
    });
    group.bench_function("wasm", |b| {
        b.iter(|| wasm.alloc(black_box(4096), true).unwrap().free())
    });

    group.finish();
}

fn bench_native(c: &mut Criterion) {
    let backend = NativeBackend::new();
    bench_encrypt(c, "native", &backend);
    bench_decrypt(c, "native", &backend);
}

fn bench_wasm(c: &mut Criterion) {
    let backend = wasm_backend();
    bench_encrypt(c, "wasm", &backend);
    bench_decrypt(c, "wasm", &backend);
}

criterion_group!(benches, bench_native, bench_wasm, bench_alloc);
criterion_main!(benches);
