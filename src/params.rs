//! Cipher configuration: operating mode and the immutable parameter set
//! supplied at `init`.

use zeroize::Zeroizing;

use crate::block::KEY_SIZES;
use crate::error::CipherError;

/// The tweak-advancement policy across sector boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The tweak auto-advances to the next sector as soon as the current
    /// one is fully consumed; a single instance may stream an arbitrarily
    /// long sequence of sectors, including a final sector shorter than
    /// `sector_size`.
    Continuous,
    /// Exactly one sector is processed per init/finalize lifecycle. Any
    /// input that would cross the sector boundary is rejected.
    Independent,
}

/// Immutable configuration for an [`XtsCipher`](crate::XtsCipher), validated
/// at construction time.
///
/// `key_data` (K1) and `key_tweak` (K2) are stored by value in
/// [`Zeroizing`] buffers so they are wiped when the parameters are dropped;
/// callers may zero their own copies immediately after constructing this.
#[derive(Clone)]
pub struct CipherParameters {
    pub(crate) mode: Mode,
    pub(crate) key_data: Zeroizing<Vec<u8>>,
    pub(crate) key_tweak: Zeroizing<Vec<u8>>,
    pub(crate) sector_size: usize,
    pub(crate) sector_index: u128,
}

impl CipherParameters {
    /// Validate and construct a parameter set.
    ///
    /// Fails with [`CipherError::Configuration`] unless `key_data` and
    /// `key_tweak` are the same length and that length is 16 or 32 bytes,
    /// and `sector_size` is at least 16.
    pub fn new(
        mode: Mode,
        key_data: &[u8],
        key_tweak: &[u8],
        sector_size: usize,
        sector_index: u128,
    ) -> Result<Self, CipherError> {
        if key_data.len() != key_tweak.len() {
            return Err(CipherError::Configuration(format!(
                "K1 and K2 must be the same length (got {} and {})",
                key_data.len(),
                key_tweak.len()
            )));
        }
        if !KEY_SIZES.contains(&key_data.len()) {
            return Err(CipherError::Configuration(format!(
                "key length must be 16 or 32 bytes, got {}",
                key_data.len()
            )));
        }
        if sector_size < 16 {
            return Err(CipherError::Configuration(format!(
                "sector_size must be at least 16 bytes, got {sector_size}"
            )));
        }
        Ok(Self {
            mode,
            key_data: Zeroizing::new(key_data.to_vec()),
            key_tweak: Zeroizing::new(key_tweak.to_vec()),
            sector_size,
            sector_index,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn sector_index(&self) -> u128 {
        self.sector_index
    }
}
