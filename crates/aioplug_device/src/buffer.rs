//! Caller-owned byte regions moved by device transfers.

use crate::error::{DeviceError, DeviceResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Unique identity of a buffer region.
///
/// Random rather than counter-based: buffers are created both by the host
/// and by backends living in other code images, each with their own statics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(Uuid);

impl BufferId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the raw 16 bytes of the id.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Element type of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// IEEE half precision float.
    F16,
    /// bfloat16.
    BF16,
    /// IEEE single precision float.
    F32,
    /// IEEE double precision float.
    F64,
}

impl ElementType {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::I16 | ElementType::F16 | ElementType::BF16 => 2,
            ElementType::I32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::F64 => 8,
        }
    }

    /// Short lowercase name (`"f32"`, `"bf16"`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }

    /// Looks up an element type by its [`name`](Self::name).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// All element types.
    pub const ALL: [ElementType; 9] = [
        ElementType::U8,
        ElementType::I8,
        ElementType::I16,
        ElementType::I32,
        ElementType::I64,
        ElementType::F16,
        ElementType::BF16,
        ElementType::F32,
        ElementType::F64,
    ];
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
struct Region {
    id: BufferId,
    dtype: ElementType,
    len: usize,
    // std lock on purpose: the region is touched by code from several loaded
    // images, and parking_lot keeps its parking table per image.
    bytes: RwLock<Vec<u8>>,
}

/// A shared, typed byte region.
///
/// Cloning an `IoBuffer` yields another handle to the same region, so a
/// backend can keep filling a buffer asynchronously while the caller holds
/// its own handle. The device core never interprets the bytes.
///
/// # Example
///
/// ```rust
/// use aioplug_device::{ElementType, IoBuffer};
///
/// let buffer = IoBuffer::zeroed(ElementType::F32, 4);
/// assert_eq!(buffer.len(), 4);
/// assert_eq!(buffer.byte_len(), 16);
///
/// let alias = buffer.clone();
/// alias.fill_from(&[1u8; 16]).unwrap();
/// assert_eq!(buffer.to_vec(), vec![1u8; 16]);
/// ```
#[derive(Debug, Clone)]
pub struct IoBuffer {
    region: Arc<Region>,
}

impl IoBuffer {
    /// Creates a zero-filled buffer of `count` elements.
    ///
    /// # Panics
    ///
    /// Panics if the byte size overflows `usize`. Use
    /// [`try_zeroed`](Self::try_zeroed) for caller-supplied counts.
    #[must_use]
    pub fn zeroed(dtype: ElementType, count: usize) -> Self {
        let bytes = match count.checked_mul(dtype.size_in_bytes()) {
            Some(bytes) => bytes,
            None => panic!("{count} {dtype} elements overflow usize"),
        };
        Self::from_parts(dtype, count, vec![0u8; bytes])
    }

    /// Creates a zero-filled buffer of `count` elements, reporting size
    /// overflow and allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidArgument`] if the byte size overflows
    /// `usize`, and [`DeviceError::Backend`] if the allocation fails.
    pub fn try_zeroed(dtype: ElementType, count: usize) -> DeviceResult<Self> {
        let bytes = count.checked_mul(dtype.size_in_bytes()).ok_or_else(|| {
            DeviceError::InvalidArgument(format!("{count} {dtype} elements overflow usize"))
        })?;
        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|err| DeviceError::Backend(format!("cannot allocate {bytes} bytes: {err}")))?;
        data.resize(bytes, 0);
        Ok(Self::from_parts(dtype, count, data))
    }

    /// Creates a zero-filled buffer with the exemplar's element type.
    ///
    /// # Panics
    ///
    /// Same as [`zeroed`](Self::zeroed).
    #[must_use]
    pub fn like(exemplar: &IoBuffer, count: usize) -> Self {
        Self::zeroed(exemplar.dtype(), count)
    }

    /// Fallible form of [`like`](Self::like).
    ///
    /// # Errors
    ///
    /// Same as [`try_zeroed`](Self::try_zeroed).
    pub fn try_like(exemplar: &IoBuffer, count: usize) -> DeviceResult<Self> {
        Self::try_zeroed(exemplar.dtype(), count)
    }

    /// Wraps raw bytes as a buffer of `dtype` elements.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidArgument`] if the byte length is not a
    /// multiple of the element size.
    pub fn from_bytes(dtype: ElementType, bytes: Vec<u8>) -> DeviceResult<Self> {
        let size = dtype.size_in_bytes();
        if bytes.len() % size != 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "{} bytes is not a whole number of {} elements",
                bytes.len(),
                dtype
            )));
        }
        Ok(Self::from_parts(dtype, bytes.len() / size, bytes))
    }

    fn from_parts(dtype: ElementType, len: usize, bytes: Vec<u8>) -> Self {
        Self {
            region: Arc::new(Region {
                id: BufferId::new(),
                dtype,
                len,
                bytes: RwLock::new(bytes),
            }),
        }
    }

    /// Returns the region's identity.
    #[must_use]
    pub fn id(&self) -> BufferId {
        self.region.id
    }

    /// Returns the element type.
    #[must_use]
    pub fn dtype(&self) -> ElementType {
        self.region.dtype
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.region.len
    }

    /// Returns true if the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.region.len * self.region.dtype.size_in_bytes()
    }

    /// Returns true if both handles refer to the same region.
    #[must_use]
    pub fn shares_region(&self, other: &IoBuffer) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// Runs `f` with shared access to the bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self
            .region
            .bytes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&bytes)
    }

    /// Runs `f` with exclusive access to the bytes.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self
            .region
            .bytes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut bytes)
    }

    /// Returns a copy of the bytes.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.with_bytes(<[u8]>::to_vec)
    }

    /// Overwrites the whole region with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidArgument`] if `data` is not exactly
    /// [`byte_len`](Self::byte_len) bytes.
    pub fn fill_from(&self, data: &[u8]) -> DeviceResult<()> {
        if data.len() != self.byte_len() {
            return Err(DeviceError::InvalidArgument(format!(
                "expected {} bytes, got {}",
                self.byte_len(),
                data.len()
            )));
        }
        self.with_bytes_mut(|bytes| bytes.copy_from_slice(data));
        Ok(())
    }

    /// SHA-256 digest of the current content.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        self.with_bytes(content_digest)
    }
}

/// SHA-256 digest of a byte slice, as used for transfer validation.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Offset of the first byte where `a` and `b` differ, if any.
///
/// A length difference counts as a mismatch at the shorter length.
#[must_use]
pub fn first_mismatch(a: &[u8], b: &[u8]) -> Option<u64> {
    match a.iter().zip(b.iter()).position(|(x, y)| x != y) {
        Some(i) => Some(i as u64),
        None if a.len() != b.len() => Some(a.len().min(b.len()) as u64),
        None => None,
    }
}
