//! Plugin ABI shared by the loader and backend code images.
//!
//! A backend code image exports two C symbols:
//!
//! ```c
//! uint32_t aioplug_abi_version(void);
//! void*    aioplug_create_device(void);
//! ```
//!
//! The loader checks the version before calling the factory. The factory
//! returns a `Box<Box<dyn Device>>` as a raw pointer (null on failure), and
//! ownership passes to the loader. Use [`export_device!`](crate::export_device)
//! instead of writing the symbols by hand.

use crate::device::Device;
use crate::error::DeviceResult;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Current plugin ABI version. Backends must report this exact value.
pub const AIOPLUG_ABI_VERSION: u32 = 1;

/// Null-terminated name of the ABI version symbol.
pub const ABI_VERSION_SYMBOL: &[u8] = b"aioplug_abi_version\0";

/// Null-terminated name of the factory symbol.
pub const FACTORY_SYMBOL: &[u8] = b"aioplug_create_device\0";

/// Type of the exported ABI version function.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Type of the exported factory function.
///
/// # Safety
///
/// A non-null result must come from [`device_into_raw`].
pub type DeviceFactoryFn = unsafe extern "C" fn() -> *mut c_void;

/// Returns a symbol constant without its trailing nul, for diagnostics.
#[must_use]
pub fn symbol_name(symbol: &[u8]) -> &str {
    let trimmed = symbol.strip_suffix(b"\0").unwrap_or(symbol);
    std::str::from_utf8(trimmed).unwrap_or("<invalid symbol>")
}

/// Converts a boxed device into the raw pointer handed across the ABI.
///
/// The trait object is boxed a second time so the pointer is thin.
pub fn device_into_raw(device: Box<dyn Device>) -> *mut c_void {
    let boxed: Box<Box<dyn Device>> = Box::new(device);
    Box::into_raw(boxed).cast::<c_void>()
}

/// Converts a raw pointer from a factory back into a boxed device.
///
/// # Safety
///
/// `ptr` must be non-null, must have been produced by [`device_into_raw`]
/// in an image built against the same ABI version, and must not be used
/// again afterwards.
pub unsafe fn device_from_raw(ptr: *mut c_void) -> Box<dyn Device> {
    // SAFETY: Caller guarantees ptr came from device_into_raw.
    let boxed: Box<Box<dyn Device>> = unsafe { Box::from_raw(ptr.cast::<Box<dyn Device>>()) };
    *boxed
}

/// Runs a backend constructor for the exported factory.
///
/// Construction errors and panics are logged and turned into a null pointer,
/// since neither may cross the C boundary.
#[doc(hidden)]
pub fn create_device_raw<D, F>(ctor: F) -> *mut c_void
where
    D: Device + 'static,
    F: FnOnce() -> DeviceResult<D>,
{
    match catch_unwind(AssertUnwindSafe(ctor)) {
        Ok(Ok(device)) => device_into_raw(Box::new(device)),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "backend construction failed");
            std::ptr::null_mut()
        }
        Err(_) => {
            tracing::error!("backend constructor panicked");
            std::ptr::null_mut()
        }
    }
}

/// Exports the plugin entry points for a backend crate.
///
/// The argument is a constructor returning `DeviceResult<impl Device>`.
/// The crate must be built as a `cdylib`.
///
/// ```rust,ignore
/// aioplug_device::export_device!(MyDevice::from_env);
/// ```
#[macro_export]
macro_rules! export_device {
    ($ctor:path) => {
        /// Reports the plugin ABI version this backend was built against.
        #[no_mangle]
        pub extern "C" fn aioplug_abi_version() -> u32 {
            $crate::AIOPLUG_ABI_VERSION
        }

        /// Constructs the backend. Ownership passes to the caller.
        #[no_mangle]
        pub extern "C" fn aioplug_create_device() -> *mut ::std::ffi::c_void {
            $crate::create_device_raw($ctor)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::IoBuffer;
    use crate::error::DeviceError;
    use std::path::Path;

    struct Fixed(usize);

    impl Device for Fixed {
        fn block_size(&self) -> usize {
            self.0
        }
        fn queue_depth(&self) -> usize {
            1
        }
        fn single_submit(&self) -> bool {
            true
        }
        fn overlap_events(&self) -> bool {
            false
        }
        fn thread_count(&self) -> usize {
            1
        }
        fn read(&self, _: &IoBuffer, _: &Path, _: bool) -> DeviceResult<()> {
            Ok(())
        }
        fn write(&self, _: &IoBuffer, _: &Path, _: bool) -> DeviceResult<()> {
            Ok(())
        }
        fn pread(&self, _: &IoBuffer, _: &Path, _: bool, _: bool) -> DeviceResult<()> {
            Ok(())
        }
        fn pwrite(&self, _: &IoBuffer, _: &Path, _: bool, _: bool) -> DeviceResult<()> {
            Ok(())
        }
        fn sync_pread(&self, _: &IoBuffer, _: &Path) -> DeviceResult<()> {
            Ok(())
        }
        fn sync_pwrite(&self, _: &IoBuffer, _: &Path) -> DeviceResult<()> {
            Ok(())
        }
        fn async_pread(&self, _: &IoBuffer, _: &Path) -> DeviceResult<()> {
            Ok(())
        }
        fn async_pwrite(&self, _: &IoBuffer, _: &Path) -> DeviceResult<()> {
            Ok(())
        }
        fn new_cpu_locked_buffer(&self, count: usize, exemplar: &IoBuffer) -> DeviceResult<IoBuffer> {
            Ok(IoBuffer::like(exemplar, count))
        }
        fn free_cpu_locked_buffer(&self, buffer: &IoBuffer) -> DeviceResult<()> {
            Err(DeviceError::UnregisteredBuffer { id: buffer.id() })
        }
        fn wait(&self) -> DeviceResult<usize> {
            Ok(0)
        }
    }

    #[test]
    fn raw_round_trip_keeps_behavior() {
        let raw = device_into_raw(Box::new(Fixed(4096)));
        assert!(!raw.is_null());
        let device = unsafe { device_from_raw(raw) };
        assert_eq!(device.block_size(), 4096);
    }

    #[test]
    fn constructor_error_yields_null() {
        let raw = create_device_raw(|| -> DeviceResult<Fixed> {
            Err(DeviceError::Backend("no device".into()))
        });
        assert!(raw.is_null());
    }

    #[test]
    fn constructor_panic_yields_null() {
        let raw = create_device_raw(|| -> DeviceResult<Fixed> { panic!("boom") });
        assert!(raw.is_null());
    }

    #[test]
    fn symbol_names_strip_nul() {
        assert_eq!(symbol_name(FACTORY_SYMBOL), "aioplug_create_device");
        assert_eq!(symbol_name(ABI_VERSION_SYMBOL), "aioplug_abi_version");
    }

    #[test]
    fn default_copy_buffer_checks_sizes() {
        let device = Fixed(1);
        let src = IoBuffer::from_bytes(crate::ElementType::U8, vec![1, 2, 3]).unwrap();
        let dest = IoBuffer::zeroed(crate::ElementType::U8, 3);
        device.copy_buffer(&dest, &src).unwrap();
        assert_eq!(dest.to_vec(), vec![1, 2, 3]);

        let small = IoBuffer::zeroed(crate::ElementType::U8, 2);
        assert!(device.copy_buffer(&small, &src).is_err());
    }
}
