//! Error types for buffer management and AEAD bindings.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SodiumError>;

/// AEAD entry point that produced an error.
///
/// Displays as the libsodium symbol name so error messages match the
/// function a caller would look up in the libsodium documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadOp {
    /// Combined-mode encryption
    Encrypt,
    /// Combined-mode decryption
    Decrypt,
    /// Detached-mode encryption
    EncryptDetached,
    /// Detached-mode decryption
    DecryptDetached,
}

impl AeadOp {
    /// libsodium symbol name of this operation.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Encrypt => "crypto_aead_xchacha20poly1305_ietf_encrypt",
            Self::Decrypt => "crypto_aead_xchacha20poly1305_ietf_decrypt",
            Self::EncryptDetached => "crypto_aead_xchacha20poly1305_ietf_encrypt_detached",
            Self::DecryptDetached => "crypto_aead_xchacha20poly1305_ietf_decrypt_detached",
        }
    }

    /// Whether this operation verifies a MAC.
    #[must_use]
    pub fn is_decrypt(self) -> bool {
        matches!(self, Self::Decrypt | Self::DecryptDetached)
    }
}

impl fmt::Display for AeadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Errors surfaced by the buffer abstraction and the AEAD bindings.
#[derive(Debug, Error)]
pub enum SodiumError {
    /// The backing store could not satisfy an allocation
    #[error("allocation of {requested} bytes failed")]
    AllocationFailed {
        /// Requested size in bytes
        requested: usize,
    },

    /// `subarray` called with `start > end`
    #[error("start must be less than or equal to end (start {start}, end {end})")]
    InvalidRange {
        /// Requested start
        start: usize,
        /// Requested end
        end: usize,
    },

    /// `subarray` end lies past the handle's own length
    #[error("subarray {start}..{end} is out of bounds for a buffer of {len} bytes")]
    OutOfBounds {
        /// Requested start
        start: usize,
        /// Requested end
        end: usize,
        /// Length of the handle being sliced
        len: usize,
    },

    /// MAC verification failed, or the input is shorter than the MAC
    #[error("{operation}: authentication failed")]
    AuthenticationFailed {
        /// Failing operation
        operation: AeadOp,
    },

    /// The underlying primitive reported a failure status
    #[error("call to {operation} failed")]
    CallFailed {
        /// Failing operation
        operation: AeadOp,
    },

    /// A fixed-size argument has the wrong length
    #[error("{operation}: invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Operation being called
        operation: AeadOp,
        /// Argument name
        what: &'static str,
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Destination buffer cannot hold the output
    #[error("{operation}: destination too small: need {required} bytes, have {actual}")]
    DestinationTooSmall {
        /// Operation being called
        operation: AeadOp,
        /// Bytes the operation writes
        required: usize,
        /// Capacity of the destination
        actual: usize,
    },

    /// Message exceeds `MESSAGEBYTES_MAX` for the backend
    #[error("{operation}: message of {len} bytes exceeds maximum of {max}")]
    MessageTooLong {
        /// Operation being called
        operation: AeadOp,
        /// Message length
        len: usize,
        /// Backend maximum
        max: usize,
    },

    /// A secret nonce was supplied; the construction has none
    #[error("{operation}: secret nonce is not supported and must be absent")]
    SecretNonceUnsupported {
        /// Operation being called
        operation: AeadOp,
    },

    /// A WASM buffer pointer from another module instance was passed in
    #[error("{operation}: buffer belongs to a different module instance")]
    ForeignBuffer {
        /// Operation being called
        operation: AeadOp,
    },

    /// The managed module failed to start
    #[error("initializing WASM-based libsodium failed: {0}")]
    InitializationFailed(String),

    /// Invalid module configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SodiumError {
    /// Translate a failure status of `operation` into the matching error.
    ///
    /// Decrypt operations can only fail verification once their arguments
    /// are validated, so they map to [`SodiumError::AuthenticationFailed`].
    #[must_use]
    pub fn from_status(operation: AeadOp) -> Self {
        if operation.is_decrypt() {
            Self::AuthenticationFailed { operation }
        } else {
            Self::CallFailed { operation }
        }
    }

    /// Whether this error is an authentication failure.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}
