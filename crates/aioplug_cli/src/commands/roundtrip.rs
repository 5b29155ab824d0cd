//! Roundtrip command implementation.

use aioplug_device::{first_mismatch, ElementType, IoBuffer};
use aioplug_loader::{Facade, PluginLoader};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Options of the roundtrip command.
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of elements to transfer.
    pub elements: usize,
    /// Element type.
    pub dtype: ElementType,
    /// Validate both transfers.
    pub validate: bool,
    /// Use asynchronous transfers.
    pub async_op: bool,
}

/// Timings of one roundtrip.
#[derive(Debug)]
pub struct RoundtripReport {
    /// Bytes transferred in each direction.
    pub bytes: usize,
    /// Time spent writing.
    pub write: Duration,
    /// Time spent reading.
    pub read: Duration,
}

/// Runs the roundtrip command.
pub fn run(
    loader: &Arc<PluginLoader>,
    backend: &str,
    path: &Path,
    options: &Options,
) -> Result<(), Box<dyn std::error::Error>> {
    loader.load(backend)?;
    let report = roundtrip(&loader.facade(), path, options)?;

    println!("Backend: {backend}");
    println!("File:    {}", path.display());
    println!(
        "Bytes:   {} ({} x {})",
        report.bytes, options.elements, options.dtype
    );
    println!(
        "Write:   {:?} ({:.1} MiB/s)",
        report.write,
        throughput(report.bytes, report.write)
    );
    println!(
        "Read:    {:?} ({:.1} MiB/s)",
        report.read,
        throughput(report.bytes, report.read)
    );
    println!("Content: OK");

    Ok(())
}

fn roundtrip(
    facade: &Facade,
    path: &Path,
    options: &Options,
) -> Result<RoundtripReport, Box<dyn std::error::Error>> {
    let source = pattern(options.dtype, options.elements)?;
    let target = IoBuffer::try_like(&source, source.len())?;

    let start = Instant::now();
    if options.async_op {
        facade.pwrite(&source, path, options.validate, true)?;
        facade.wait()?;
    } else {
        facade.write(&source, path, options.validate)?;
    }
    let write = start.elapsed();

    let start = Instant::now();
    if options.async_op {
        facade.pread(&target, path, options.validate, true)?;
        facade.wait()?;
    } else {
        facade.read(&target, path, options.validate)?;
    }
    let read = start.elapsed();

    let written = source.to_vec();
    let read_back = target.to_vec();
    if let Some(offset) = first_mismatch(&written, &read_back) {
        return Err(format!("Content differs at byte {offset}").into());
    }

    Ok(RoundtripReport {
        bytes: written.len(),
        write,
        read,
    })
}

fn pattern(dtype: ElementType, elements: usize) -> Result<IoBuffer, Box<dyn std::error::Error>> {
    let buffer = IoBuffer::try_zeroed(dtype, elements)?;
    buffer.with_bytes_mut(|bytes| {
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
    });
    Ok(buffer)
}

fn throughput(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / (1024.0 * 1024.0) / secs
    } else {
        0.0
    }
}
