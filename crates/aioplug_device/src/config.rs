//! Backend configuration.

use crate::error::{DeviceError, DeviceResult};
use std::str::FromStr;

/// Environment variable overriding [`DeviceConfig::block_size`].
pub const ENV_BLOCK_SIZE: &str = "AIOPLUG_BLOCK_SIZE";
/// Environment variable overriding [`DeviceConfig::queue_depth`].
pub const ENV_QUEUE_DEPTH: &str = "AIOPLUG_QUEUE_DEPTH";
/// Environment variable overriding [`DeviceConfig::single_submit`].
pub const ENV_SINGLE_SUBMIT: &str = "AIOPLUG_SINGLE_SUBMIT";
/// Environment variable overriding [`DeviceConfig::overlap_events`].
pub const ENV_OVERLAP_EVENTS: &str = "AIOPLUG_OVERLAP_EVENTS";
/// Environment variable overriding [`DeviceConfig::thread_count`].
pub const ENV_THREAD_COUNT: &str = "AIOPLUG_THREAD_COUNT";
/// Environment variable overriding [`DeviceConfig::max_pending`].
pub const ENV_MAX_PENDING: &str = "AIOPLUG_MAX_PENDING";

/// Configuration shared by backend implementations.
///
/// Plugin factories take no arguments, so backends built as code images read
/// their configuration from the environment with [`DeviceConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Transfer block size in bytes.
    pub block_size: usize,

    /// Requests kept in flight per submission.
    pub queue_depth: usize,

    /// Submit requests one at a time.
    pub single_submit: bool,

    /// Allow completion events of consecutive submissions to overlap.
    pub overlap_events: bool,

    /// Worker threads serving asynchronous operations.
    pub thread_count: usize,

    /// Maximum outstanding asynchronous operations before `QueueFull`.
    pub max_pending: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            block_size: 1024 * 1024, // 1 MiB
            queue_depth: 8,
            single_submit: false,
            overlap_events: true,
            thread_count: 1,
            max_pending: 1024,
        }
    }
}

impl DeviceConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from `AIOPLUG_*` environment variables.
    ///
    /// Unset variables keep their default. Unparsable values are logged and
    /// ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            block_size: env_or(ENV_BLOCK_SIZE, defaults.block_size),
            queue_depth: env_or(ENV_QUEUE_DEPTH, defaults.queue_depth),
            single_submit: env_flag_or(ENV_SINGLE_SUBMIT, defaults.single_submit),
            overlap_events: env_flag_or(ENV_OVERLAP_EVENTS, defaults.overlap_events),
            thread_count: env_or(ENV_THREAD_COUNT, defaults.thread_count),
            max_pending: env_or(ENV_MAX_PENDING, defaults.max_pending),
        }
    }

    /// Sets the block size.
    #[must_use]
    pub const fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the queue depth.
    #[must_use]
    pub const fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Sets single-submit mode.
    #[must_use]
    pub const fn with_single_submit(mut self, value: bool) -> Self {
        self.single_submit = value;
        self
    }

    /// Sets event overlap.
    #[must_use]
    pub const fn with_overlap_events(mut self, value: bool) -> Self {
        self.overlap_events = value;
        self
    }

    /// Sets the worker thread count.
    #[must_use]
    pub const fn with_thread_count(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Sets the maximum number of outstanding asynchronous operations.
    #[must_use]
    pub const fn with_max_pending(mut self, count: usize) -> Self {
        self.max_pending = count;
        self
    }

    /// Checks that every size and count is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidArgument`] naming the first zero field.
    pub fn validate(&self) -> DeviceResult<()> {
        let fields = [
            ("block_size", self.block_size),
            ("queue_depth", self.queue_depth),
            ("thread_count", self.thread_count),
            ("max_pending", self.max_pending),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(DeviceError::InvalidArgument(format!(
                "{name} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }
}

fn env_or<T: FromStr + Copy>(var: &str, default: T) -> T {
    match std::env::var(var) {
        Ok(raw) => parse_or(var, raw.trim(), default),
        Err(_) => default,
    }
}

fn env_flag_or(var: &str, default: bool) -> bool {
    match std::env::var(var) {
        Ok(raw) => parse_flag(var, raw.trim(), default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr + Copy>(var: &str, raw: &str, default: T) -> T {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(var, value = raw, "ignoring unparsable setting");
        default
    })
}

fn parse_flag(var: &str, raw: &str, default: bool) -> bool {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(var, value = raw, "ignoring unparsable flag");
            default
        }
    }
}
