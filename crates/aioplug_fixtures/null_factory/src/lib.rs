//! Code image whose factory fails to produce a device.

use std::ffi::c_void;

/// Reports the loader's ABI version.
#[no_mangle]
pub extern "C" fn aioplug_abi_version() -> u32 {
    aioplug_device::AIOPLUG_ABI_VERSION
}

/// Always fails.
#[no_mangle]
pub extern "C" fn aioplug_create_device() -> *mut c_void {
    std::ptr::null_mut()
}
