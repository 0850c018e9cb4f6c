//! Error types for the streaming XTS-AES cipher.

use thiserror::Error as ThisError;

/// Everything that can go wrong constructing or driving an [`XtsCipher`](crate::XtsCipher).
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Invalid or mismatched key lengths, a sector size below the 16-byte
    /// minimum, or a sector index that would overflow 128 bits before the
    /// operation completes.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A call was made in a state where it is not permitted, e.g. `process`
    /// before `init`, or anything other than `init` after `finalize`.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// `finalize` was called with fewer than 16 bytes consumed in the
    /// active sector. XTS requires at least one full block per data unit.
    #[error("insufficient data: only {consumed} byte(s) consumed, at least 16 required")]
    InsufficientData {
        /// Bytes actually consumed for the active sector.
        consumed: usize,
    },

    /// Independent mode: the total bytes consumed did not equal
    /// `sector_size` at `finalize`, or input was fed that would have
    /// crossed a sector boundary.
    #[error("size mismatch: expected exactly {expected} byte(s), got {actual}")]
    SizeMismatch {
        /// The configured `sector_size`.
        expected: usize,
        /// Bytes actually consumed (or attempted) for the active sector.
        actual: usize,
    },

    /// The caller-provided output slice was too small for the guaranteed
    /// emission of this call.
    #[error("output buffer too small: need at least {needed} byte(s), got {available}")]
    OutputBufferTooSmall {
        /// Minimum bytes required to complete this call.
        needed: usize,
        /// Bytes actually available in the caller's output slice.
        available: usize,
    },
}

/// Convenience alias for a result carrying a [`CipherError`].
pub type CipherResult<T> = Result<T, CipherError>;
