//! Streaming AES-XTS (IEEE P1619 / NIST SP 800-38E).
//!
//! XTS is the block cipher mode used by disk and storage encryption
//! (BitLocker, LUKS2, dm-crypt `plain64` devices, Nintendo Switch NCA
//! headers) to give length-preserving confidentiality over fixed-size
//! "sectors" without expanding the ciphertext. This crate implements the
//! mode itself as a resumable streaming state machine: callers feed it
//! arbitrarily sized chunks of plaintext or ciphertext and it tracks
//! sector/tweak bookkeeping and ciphertext-stealing (CTS) across chunk
//! boundaries, without ever requiring a whole sector to be buffered in
//! memory by this crate.
//!
//! The AES block permutation itself is not implemented here; it is
//! supplied by the [`aes`] crate via [`cipher`]'s [`BlockEncrypt`]/
//! [`BlockDecrypt`]/[`KeyInit`] traits. Random key generation, key
//! derivation, and all file/disk I/O are the caller's responsibility.
//!
//! [`BlockEncrypt`]: cipher::BlockEncrypt
//! [`BlockDecrypt`]: cipher::BlockDecrypt
//! [`KeyInit`]: cipher::KeyInit

mod block;
mod cipher_impl;
mod error;
mod gf128;
mod params;

pub use block::{AesEngine, BlockCipher, BLOCK_SIZE};
pub use cipher_impl::XtsCipher;
pub use error::{CipherError, CipherResult};
pub use params::{CipherParameters, Mode};
