//! # aioplug device
//!
//! Device contract, buffers and plugin ABI shared by the aioplug loader and
//! its backends.
//!
//! A backend is one implementation of [`Device`]: a block-I/O strategy that
//! moves [`IoBuffer`]s to and from files. Backends are usually built as
//! separate code images and picked at run time by `aioplug_loader`.
//!
//! ## Design Principles
//!
//! - The contract is a fixed interface; any change bumps
//!   [`AIOPLUG_ABI_VERSION`]
//! - Buffers are opaque, shared byte regions; the core never interprets them
//! - Errors are plain data so they outlive the image that produced them
//! - Backends must be `Send + Sync`
//!
//! ## Writing a backend
//!
//! ```rust,ignore
//! use aioplug_device::{export_device, Device, DeviceConfig, DeviceResult};
//!
//! struct MyDevice { config: DeviceConfig }
//!
//! impl MyDevice {
//!     fn from_env() -> DeviceResult<Self> {
//!         Ok(Self { config: DeviceConfig::from_env() })
//!     }
//! }
//!
//! impl Device for MyDevice {
//!     // ...
//! }
//!
//! export_device!(MyDevice::from_env);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

// Raw pointer conversions for the plugin boundary.
#[allow(unsafe_code)]
mod abi;
mod buffer;
mod config;
mod device;
mod error;
mod released;

pub use abi::{
    create_device_raw, device_from_raw, device_into_raw, symbol_name, AbiVersionFn,
    DeviceFactoryFn, ABI_VERSION_SYMBOL, AIOPLUG_ABI_VERSION, FACTORY_SYMBOL,
};
pub use buffer::{content_digest, first_mismatch, BufferId, ElementType, IoBuffer};
pub use config::{
    DeviceConfig, ENV_BLOCK_SIZE, ENV_MAX_PENDING, ENV_OVERLAP_EVENTS, ENV_QUEUE_DEPTH,
    ENV_SINGLE_SUBMIT, ENV_THREAD_COUNT,
};
pub use device::Device;
pub use error::{DeviceError, DeviceResult, Operation};
pub use released::ReleasedIds;
