//! The AES block engine (external collaborator) and the stateless XTS kernel.
//!
//! The cipher mode logic in this crate never touches AES round keys or the
//! S-box directly; it only calls through [`BlockCipher`], a small capability
//! interface. The concrete implementation, [`AesEngine`], wraps the `aes`
//! crate's [`aes::Aes128`]/[`aes::Aes256`] and is matched on in the hot loop
//! rather than invoked through a `dyn Trait`, keeping the key-size dispatch
//! monomorphized and avoiding virtual calls in the inner loop.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};

use crate::error::CipherError;

/// XTS operates on 128-bit (16-byte) blocks, independent of the key size.
pub const BLOCK_SIZE: usize = 16;

/// Key sizes this crate accepts for K1/K2 (AES-128 and AES-256; AES-192 is
/// not part of the XTS standard's defined key schedule).
pub const KEY_SIZES: [usize; 2] = [16, 32];

/// The capability interface the XTS core depends on: single-block,
/// ECB-style encrypt/decrypt under a previously installed key.
///
/// Implementations own their key schedule and must support being
/// overwritten by a fresh `set_key` call (re-init).
pub trait BlockCipher: Sized {
    /// Block size in bytes; always 16 for AES.
    fn block_size() -> usize {
        BLOCK_SIZE
    }

    /// Key sizes this implementation accepts, in bytes.
    fn key_sizes() -> &'static [usize] {
        &KEY_SIZES
    }

    /// Install `key`, which must be one of [`Self::key_sizes`] bytes long.
    ///
    /// `for_encryption` is accepted for interface symmetry with ciphers
    /// whose key schedules differ by direction; AES's does not, so
    /// [`AesEngine`] ignores it and keys itself for both directions.
    fn set_key(key: &[u8], for_encryption: bool) -> Result<Self, CipherError>;

    /// Encrypt one 16-byte block in place.
    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]);

    /// Decrypt one 16-byte block in place.
    fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]);
}

/// The AES block engine, keyed for either AES-128 or AES-256, dispatched by
/// a match rather than a vtable.
pub enum AesEngine {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl BlockCipher for AesEngine {
    fn set_key(key: &[u8], _for_encryption: bool) -> Result<Self, CipherError> {
        match key.len() {
            16 => Ok(AesEngine::Aes128(Box::new(Aes128::new_from_slice(key).map_err(
                |_| CipherError::Configuration("invalid AES-128 key length".into()),
            )?))),
            32 => Ok(AesEngine::Aes256(Box::new(Aes256::new_from_slice(key).map_err(
                |_| CipherError::Configuration("invalid AES-256 key length".into()),
            )?))),
            other => Err(CipherError::Configuration(format!(
                "key length must be 16 or 32 bytes, got {other}"
            ))),
        }
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let ga = aes::Block::from_mut_slice(block.as_mut_slice());
        match self {
            AesEngine::Aes128(c) => c.encrypt_block(ga),
            AesEngine::Aes256(c) => c.encrypt_block(ga),
        }
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let ga = aes::Block::from_mut_slice(block.as_mut_slice());
        match self {
            AesEngine::Aes128(c) => c.decrypt_block(ga),
            AesEngine::Aes256(c) => c.decrypt_block(ga),
        }
    }
}

/// XOR `b` into `a` in place.
fn xor_in_place(a: &mut [u8; BLOCK_SIZE], b: &[u8; BLOCK_SIZE]) {
    for i in 0..BLOCK_SIZE {
        a[i] ^= b[i];
    }
}

/// The stateless XTS kernel: `C = E_K1(P XOR T) XOR T` for a single,
/// already block-aligned 16-byte input, given the tweak for that block.
pub fn xts_encrypt_block<C: BlockCipher>(cipher: &C, block: &[u8; BLOCK_SIZE], tweak: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut work = *block;
    xor_in_place(&mut work, tweak);
    cipher.encrypt_block(&mut work);
    xor_in_place(&mut work, tweak);
    work
}

/// Inverse of [`xts_encrypt_block`]: `P = D_K1(C XOR T) XOR T`.
pub fn xts_decrypt_block<C: BlockCipher>(cipher: &C, block: &[u8; BLOCK_SIZE], tweak: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut work = *block;
    xor_in_place(&mut work, tweak);
    cipher.decrypt_block(&mut work);
    xor_in_place(&mut work, tweak);
    work
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xts_block_roundtrips() {
        let cipher = AesEngine::set_key(&[0x11u8; 16], true).unwrap();
        let tweak = [0x22u8; 16];
        let plaintext = [0x33u8; 16];
        let ciphertext = xts_encrypt_block(&cipher, &plaintext, &tweak);
        assert_ne!(ciphertext, plaintext);
        let recovered = xts_decrypt_block(&cipher, &ciphertext, &tweak);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn rejects_bad_key_length() {
        let err = AesEngine::set_key(&[0u8; 24], true).unwrap_err();
        assert!(matches!(err, CipherError::Configuration(_)));
    }

    #[test]
    fn aes_256_key_selects_the_256_bit_variant() {
        let cipher = AesEngine::set_key(&[0u8; 32], true).unwrap();
        assert!(matches!(cipher, AesEngine::Aes256(_)));
    }
}
