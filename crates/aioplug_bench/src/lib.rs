//! Benchmark utilities.

#![warn(missing_docs)]

use aioplug_device::{Device, DeviceConfig, ElementType, IoBuffer};
use aioplug_file::FileDevice;
use aioplug_loader::{BackendRegistry, Facade, LoaderConfig, PluginLoader};
use aioplug_testkit::MemoryDevice;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;

/// Generates a buffer of `bytes` random bytes.
pub fn random_buffer(bytes: usize) -> IoBuffer {
    let mut rng = rand::thread_rng();
    let data: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    IoBuffer::from_bytes(ElementType::U8, data).expect("u8 buffers accept any length")
}

/// Returns a facade with `file` and `memory` builtins, the file backend
/// using `threads` workers, loaded with `backend`.
pub fn bench_facade(root: &Path, backend: &str, threads: usize) -> Facade {
    let registry = BackendRegistry::new();
    registry.register("file", move || {
        let config = DeviceConfig::new()
            .with_block_size(1 << 20)
            .with_thread_count(threads)
            .with_max_pending(1 << 16);
        Ok(Box::new(FileDevice::new(config)?) as Box<dyn Device>)
    });
    registry.register("memory", || Ok(Box::new(MemoryDevice::new()) as Box<dyn Device>));

    let loader = Arc::new(PluginLoader::with_registry(
        LoaderConfig::new().root(root),
        registry,
    ));
    loader.load(backend).expect("Failed to load bench backend");
    loader.facade()
}
