//! Error types for backend loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that can occur while loading a backend.
///
/// All of them leave the loader in a well-defined state: unloaded, or still
/// holding the previous backend under `ReloadPolicy::KeepLastGood`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The backend name cannot be mapped to a code image.
    #[error("invalid backend name: {0:?}")]
    InvalidName(String),

    /// The code image could not be opened.
    #[error("cannot open library {}: {reason}", path.display())]
    Open {
        /// Path that was tried.
        path: PathBuf,
        /// Error reported by the dynamic linker.
        reason: String,
    },

    /// A required symbol is not exported by the code image.
    #[error("cannot load symbol {symbol}: {reason}")]
    MissingSymbol {
        /// Name of the symbol.
        symbol: &'static str,
        /// Error reported by the dynamic linker.
        reason: String,
    },

    /// The code image was built against a different plugin ABI.
    #[error("ABI version mismatch: expected {expected}, got {actual}")]
    AbiMismatch {
        /// ABI version of this loader.
        expected: u32,
        /// ABI version reported by the backend.
        actual: u32,
    },

    /// The factory returned no instance.
    #[error("backend {name} returned a null instance")]
    NullInstance {
        /// Backend name.
        name: String,
    },

    /// A builtin factory failed.
    #[error("builtin backend {name} failed: {reason}")]
    Builtin {
        /// Backend name.
        name: String,
        /// Failure reported by the factory.
        reason: String,
    },
}

impl LoadError {
    /// Returns true if the code image itself could not be found or opened.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, LoadError::Open { .. })
    }

    /// Returns true if the code image opened but did not satisfy the ABI.
    pub fn is_symbol_failure(&self) -> bool {
        matches!(
            self,
            LoadError::MissingSymbol { .. } | LoadError::AbiMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LoadError::AbiMismatch {
            expected: 1,
            actual: 7,
        };
        assert_eq!(err.to_string(), "ABI version mismatch: expected 1, got 7");

        let err = LoadError::MissingSymbol {
            symbol: "aioplug_create_device",
            reason: "undefined symbol".into(),
        };
        assert!(err.to_string().contains("aioplug_create_device"));
    }

    #[test]
    fn classification() {
        let open = LoadError::Open {
            path: PathBuf::from("/nowhere/x_op.so"),
            reason: "no such file".into(),
        };
        assert!(open.is_open_failure());
        assert!(!open.is_symbol_failure());

        let abi = LoadError::AbiMismatch {
            expected: 1,
            actual: 2,
        };
        assert!(abi.is_symbol_failure());
    }
}
