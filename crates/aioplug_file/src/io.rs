//! Chunked file transfers between buffers and files.

use aioplug_device::{DeviceError, DeviceResult, IoBuffer};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// Size of the file at `path` in bytes.
pub(crate) fn file_len(path: &Path) -> DeviceResult<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| DeviceError::io(path, &e))
}

/// Fills `buffer` from a file that must be exactly as long as the buffer.
pub(crate) fn read_whole(buffer: &IoBuffer, path: &Path, block_size: usize) -> DeviceResult<()> {
    let expected = buffer.byte_len() as u64;
    let actual = file_len(path)?;
    if actual != expected {
        return Err(DeviceError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    buffer.with_bytes_mut(|bytes| read_blocks(path, bytes, block_size))
}

/// Fills `buffer` from the start of a file at least as long as the buffer.
pub(crate) fn read_prefix(buffer: &IoBuffer, path: &Path, block_size: usize) -> DeviceResult<()> {
    let needed = buffer.byte_len() as u64;
    let available = file_len(path)?;
    if available < needed {
        return Err(DeviceError::ShortFile {
            path: path.to_path_buf(),
            needed,
            available,
        });
    }
    buffer.with_bytes_mut(|bytes| read_blocks(path, bytes, block_size))
}

/// Writes `data` to `path` in `block_size` chunks.
///
/// With `truncate` the file ends up exactly `data.len()` bytes long;
/// otherwise bytes past the end of `data` are left untouched.
pub(crate) fn write_blocks(
    path: &Path,
    data: &[u8],
    block_size: usize,
    truncate: bool,
) -> DeviceResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)
        .map_err(|e| DeviceError::io(path, &e))?;

    for chunk in data.chunks(block_size.max(1)) {
        file.write_all(chunk).map_err(|e| DeviceError::io(path, &e))?;
    }
    file.flush().map_err(|e| DeviceError::io(path, &e))
}

/// Reads the first `len` bytes of `path`, or the whole file if `len` is None.
pub(crate) fn read_back(path: &Path, len: Option<usize>) -> DeviceResult<Vec<u8>> {
    match len {
        None => std::fs::read(path).map_err(|e| DeviceError::io(path, &e)),
        Some(len) => {
            let mut data = vec![0u8; len];
            read_blocks(path, &mut data, len.max(1))?;
            Ok(data)
        }
    }
}

fn read_blocks(path: &Path, out: &mut [u8], block_size: usize) -> DeviceResult<()> {
    let mut file = File::open(path).map_err(|e| DeviceError::io(path, &e))?;
    for chunk in out.chunks_mut(block_size.max(1)) {
        file.read_exact(chunk).map_err(|e| DeviceError::io(path, &e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aioplug_device::ElementType;
    use tempfile::tempdir;

    #[test]
    fn write_in_small_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blocks.bin");
        let data: Vec<u8> = (0..=255).collect();

        write_blocks(&path, &data, 7, true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn truncating_write_shrinks_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shrink.bin");
        std::fs::write(&path, vec![9u8; 100]).unwrap();

        write_blocks(&path, &[1, 2, 3], 2, true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn overwrite_keeps_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tail.bin");
        std::fs::write(&path, vec![9u8; 6]).unwrap();

        write_blocks(&path, &[1, 2], 4, false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 9, 9, 9, 9]);
    }

    #[test]
    fn read_whole_requires_exact_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exact.bin");
        std::fs::write(&path, vec![1u8; 10]).unwrap();

        let buffer = IoBuffer::zeroed(ElementType::U8, 8);
        let err = read_whole(&buffer, &path, 4).unwrap_err();
        assert_eq!(
            err,
            DeviceError::SizeMismatch {
                path: path.clone(),
                expected: 8,
                actual: 10
            }
        );
    }

    #[test]
    fn read_prefix_of_longer_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long.bin");
        std::fs::write(&path, (0u8..20).collect::<Vec<_>>()).unwrap();

        let buffer = IoBuffer::zeroed(ElementType::I16, 4);
        read_prefix(&buffer, &path, 3).unwrap();
        assert_eq!(buffer.to_vec(), (0u8..8).collect::<Vec<_>>());
    }

    #[test]
    fn read_prefix_of_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [0u8; 3]).unwrap();

        let buffer = IoBuffer::zeroed(ElementType::U8, 4);
        assert!(matches!(
            read_prefix(&buffer, &path, 16),
            Err(DeviceError::ShortFile {
                needed: 4,
                available: 3,
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let buffer = IoBuffer::zeroed(ElementType::U8, 1);
        assert_eq!(
            read_whole(&buffer, &path, 1),
            Err(DeviceError::NotFound { path })
        );
    }
}
