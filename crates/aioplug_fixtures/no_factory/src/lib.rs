//! Code image exporting the ABI version but no factory.

/// Reports the loader's ABI version.
#[no_mangle]
pub extern "C" fn aioplug_abi_version() -> u32 {
    aioplug_device::AIOPLUG_ABI_VERSION
}
