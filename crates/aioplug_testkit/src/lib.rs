//! # aioplug testkit
//!
//! Test utilities for aioplug.
//!
//! This crate provides:
//! - [`MemoryDevice`], an in-memory backend with fault injection and
//!   live-instance counting
//! - Loader fixtures over temporary directories
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aioplug_testkit::prelude::*;
//!
//! #[test]
//! fn reload_switches_backend() {
//!     with_loader(|t| {
//!         t.loader.load("a").unwrap();
//!         t.loader.load("b").unwrap();
//!         assert_eq!(t.facade().queue_depth().unwrap(), config_b().queue_depth);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod memory;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::memory::*;
}

pub use fixtures::*;
pub use generators::*;
pub use memory::*;
