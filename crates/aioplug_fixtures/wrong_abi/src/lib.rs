//! Code image built against a plugin ABI the loader does not speak.
//!
//! Loading it must fail before the factory is called.

use std::ffi::c_void;

/// Reports an ABI version one ahead of the loader's.
#[no_mangle]
pub extern "C" fn aioplug_abi_version() -> u32 {
    aioplug_device::AIOPLUG_ABI_VERSION + 1
}

/// Never reached by a loader that checks the version first.
#[no_mangle]
pub extern "C" fn aioplug_create_device() -> *mut c_void {
    std::ptr::null_mut()
}
