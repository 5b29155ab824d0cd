//! Probe command implementation.

use aioplug_loader::{BackendSource, PluginLoader};
use serde::Serialize;

/// Configuration reported by a loaded backend.
#[derive(Debug, Serialize)]
pub struct ProbeResult {
    /// Backend name.
    pub backend: String,
    /// `builtin` or the path of the code image.
    pub source: String,
    /// Transfer block size in bytes.
    pub block_size: usize,
    /// Queue depth.
    pub queue_depth: usize,
    /// Single-submit mode.
    pub single_submit: bool,
    /// Overlap-events mode.
    pub overlap_events: bool,
    /// Worker thread count.
    pub thread_count: usize,
}

/// Runs the probe command.
pub fn run(
    loader: &std::sync::Arc<PluginLoader>,
    backend: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = probe(loader, backend)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Backend:        {}", result.backend);
            println!("Source:         {}", result.source);
            println!("Block size:     {} bytes", result.block_size);
            println!("Queue depth:    {}", result.queue_depth);
            println!("Single submit:  {}", result.single_submit);
            println!("Overlap events: {}", result.overlap_events);
            println!("Threads:        {}", result.thread_count);
        }
    }

    Ok(())
}

fn probe(
    loader: &std::sync::Arc<PluginLoader>,
    backend: &str,
) -> Result<ProbeResult, Box<dyn std::error::Error>> {
    loader.load(backend)?;
    let facade = loader.facade();
    let source = match loader.backend_source() {
        Some(BackendSource::Library(path)) => path.display().to_string(),
        _ => "builtin".to_string(),
    };

    Ok(ProbeResult {
        backend: backend.to_string(),
        source,
        block_size: facade.block_size()?,
        queue_depth: facade.queue_depth()?,
        single_submit: facade.single_submit()?,
        overlap_events: facade.overlap_events()?,
        thread_count: facade.thread_count()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aioplug_device::{Device, DeviceConfig};
    use aioplug_file::FileDevice;
    use aioplug_loader::{BackendRegistry, LoaderConfig};
    use std::sync::Arc;

    #[test]
    fn probe_builtin_file_backend() {
        let registry = BackendRegistry::new();
        registry.register("file", || {
            let config = DeviceConfig::new().with_block_size(8192).with_queue_depth(4);
            Ok(Box::new(FileDevice::new(config)?) as Box<dyn Device>)
        });
        let loader = Arc::new(PluginLoader::with_registry(LoaderConfig::new(), registry));

        let result = probe(&loader, "file").unwrap();
        assert_eq!(result.source, "builtin");
        assert_eq!(result.block_size, 8192);
        assert_eq!(result.queue_depth, 4);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["backend"], "file");
        assert_eq!(json["block_size"], 8192);
    }

    #[test]
    fn probe_unknown_backend_fails() {
        let loader = Arc::new(PluginLoader::new(LoaderConfig::new().root("/nonexistent")));
        assert!(probe(&loader, "missing").is_err());
        assert!(!loader.is_loaded());
    }
}
