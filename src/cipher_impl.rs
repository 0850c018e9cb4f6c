//! The buffered streaming XTS-AES cipher: the init/process/finalize state
//! machine, ciphertext stealing, and sector/tweak bookkeeping. This is
//! where nearly all of the crate's complexity lives; [`gf128`](crate::gf128)
//! and [`block`](crate::block) are the stateless primitives it calls into.

use tracing::{debug, trace, warn};
use zeroize::Zeroize;

use crate::block::{xts_decrypt_block, xts_encrypt_block, AesEngine, BlockCipher, BLOCK_SIZE};
use crate::error::CipherError;
use crate::gf128;
use crate::params::{CipherParameters, Mode};

/// Lifecycle states. There is no explicit `Uninitialized` variant: an
/// [`XtsCipher`] only exists once constructed by [`XtsCipher::new`], which
/// is itself the `init` transition into `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Processing,
    Finalized,
}

/// A withheld, fully-consumed block plus the tweak it was (or would be)
/// processed under, kept back in case it turns out to be the penultimate
/// block of a sector whose tail needs ciphertext stealing.
type Withheld = ([u8; BLOCK_SIZE], [u8; BLOCK_SIZE]);

/// A streaming AES-XTS cipher instance, bound to one direction
/// (encryption or decryption) and one [`CipherParameters`] set.
///
/// Feed input of any size via [`process`](Self::process) or
/// [`process_byte`](Self::process_byte), then call
/// [`finalize`](Self::finalize) exactly once to flush any withheld block
/// and/or apply ciphertext stealing. The instance may be reused across
/// sectors (`Mode::Continuous`) or re-initialized for a new one
/// (`Mode::Independent`, or simply calling [`reinit`](Self::reinit) again).
pub struct XtsCipher {
    for_encryption: bool,
    params: CipherParameters,
    aes_data: AesEngine,
    aes_tweak: AesEngine,
    current_tweak: [u8; BLOCK_SIZE],
    current_sector: u128,
    sector_offset: usize,
    partial_buf: [u8; BLOCK_SIZE],
    partial_len: u8,
    withheld: Option<Withheld>,
    state: State,
}

impl XtsCipher {
    /// Validate `params` and derive fresh state for sector
    /// `params.sector_index()`. This is the `init` operation.
    pub fn new(for_encryption: bool, params: CipherParameters) -> Result<Self, CipherError> {
        let aes_data = AesEngine::set_key(&params.key_data, for_encryption)?;
        let aes_tweak = AesEngine::set_key(&params.key_tweak, true)?;
        let current_sector = params.sector_index;
        let mut cipher = Self {
            for_encryption,
            params,
            aes_data,
            aes_tweak,
            current_tweak: [0u8; BLOCK_SIZE],
            current_sector,
            sector_offset: 0,
            partial_buf: [0u8; BLOCK_SIZE],
            partial_len: 0,
            withheld: None,
            state: State::Ready,
        };
        cipher.current_tweak = cipher.initial_tweak(current_sector);
        debug!(sector = %current_sector, mode = ?cipher.params.mode(), "xts cipher initialized");
        Ok(cipher)
    }

    /// Re-initialize this instance in place with new direction/parameters,
    /// fully resetting tweak, sector, and buffer state. Legal from any
    /// state, including `Finalized`.
    pub fn reinit(&mut self, for_encryption: bool, params: CipherParameters) -> Result<(), CipherError> {
        *self = Self::new(for_encryption, params)?;
        Ok(())
    }

    /// The mode this instance was configured with.
    pub fn mode(&self) -> Mode {
        self.params.mode()
    }

    /// Upper bound on bytes [`process`](Self::process) may emit for
    /// `pending_input_len` bytes of new input: `pending_input_len + 16`.
    pub fn output_size(&self, pending_input_len: usize) -> usize {
        pending_input_len + BLOCK_SIZE
    }

    /// Feed one byte of input. A rare-use convenience over
    /// [`process`](Self::process); most callers should prefer batching.
    pub fn process_byte(&mut self, byte: u8, out: &mut [u8]) -> Result<usize, CipherError> {
        self.process(&[byte], out)
    }

    /// Feed `input` and write any emittable output to `out`, returning the
    /// number of bytes written. `out` must have room for at least
    /// `input.len() + 16` bytes (see [`output_size`](Self::output_size)).
    pub fn process(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize, CipherError> {
        match self.state {
            State::Finalized => {
                return Err(CipherError::Lifecycle(
                    "process called after finalize; call reinit first".into(),
                ))
            }
            State::Ready => {
                self.state = State::Processing;
                trace!("first process call; entering Processing state");
            }
            State::Processing => {}
        }

        let mut out_pos = 0usize;
        let mut pos = 0usize;
        let sector_size = self.params.sector_size();

        while pos < input.len() {
            if self.mode() == Mode::Independent && self.sector_offset == sector_size {
                warn!("independent-mode input crossed the sector boundary");
                return Err(CipherError::SizeMismatch {
                    expected: sector_size,
                    actual: self.sector_offset + (input.len() - pos),
                });
            }

            let need = BLOCK_SIZE - self.partial_len as usize;
            let available = input.len() - pos;
            let remaining_in_sector = sector_size - self.sector_offset;
            let take = need.min(available).min(remaining_in_sector);
            let start = self.partial_len as usize;
            self.partial_buf[start..start + take].copy_from_slice(&input[pos..pos + take]);
            self.partial_len += take as u8;
            self.sector_offset += take;
            pos += take;

            if self.partial_len as usize == BLOCK_SIZE {
                self.handle_full_block(out, &mut out_pos)?;
            }

            if self.sector_offset == sector_size {
                if self.mode() == Mode::Continuous {
                    self.finish_sector(sector_size, out, &mut out_pos)?;
                    // finish_sector's CTS path consumes a partial tail left
                    // in partial_buf without running handle_full_block, so
                    // partial_len (unlike sector_offset) isn't cleared yet.
                    self.partial_len = 0;
                    self.advance_to_next_sector()?;
                }
                // Independent mode: completion is only legal inside finalize.
            }
        }

        Ok(out_pos)
    }

    /// Flush any withheld block and/or apply ciphertext stealing, ending
    /// the stream. `out` must have room for at least 32 bytes.
    pub fn finalize(&mut self, out: &mut [u8]) -> Result<usize, CipherError> {
        if self.state == State::Finalized {
            return Err(CipherError::Lifecycle(
                "finalize called twice; call reinit first".into(),
            ));
        }

        let mut out_pos = 0usize;

        if self.sector_offset == 0 {
            trace!("finalize with nothing pending");
            self.state = State::Finalized;
            return Ok(0);
        }

        if self.sector_offset < BLOCK_SIZE {
            warn!(consumed = self.sector_offset, "finalize with less than one block consumed");
            return Err(CipherError::InsufficientData {
                consumed: self.sector_offset,
            });
        }

        if self.mode() == Mode::Independent && self.sector_offset != self.params.sector_size() {
            warn!(
                expected = self.params.sector_size(),
                actual = self.sector_offset,
                "independent-mode sector incomplete at finalize"
            );
            return Err(CipherError::SizeMismatch {
                expected: self.params.sector_size(),
                actual: self.sector_offset,
            });
        }

        let effective_len = self.sector_offset;
        self.finish_sector(effective_len, out, &mut out_pos)?;
        self.sector_offset = 0;
        self.partial_len = 0;
        self.state = State::Finalized;
        debug!(emitted = out_pos, "xts cipher finalized");
        Ok(out_pos)
    }

    /// Encrypt or decrypt one block, per this instance's configured
    /// direction, using the stateless XTS kernel.
    fn process_block(&self, block: &[u8; BLOCK_SIZE], tweak: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        if self.for_encryption {
            xts_encrypt_block(&self.aes_data, block, tweak)
        } else {
            xts_decrypt_block(&self.aes_data, block, tweak)
        }
    }

    fn initial_tweak(&self, sector: u128) -> [u8; BLOCK_SIZE] {
        let mut t = gf128::encode_sector(sector);
        self.aes_tweak.encrypt_block(&mut t);
        t
    }

    /// A just-completed 16-byte block either gets emitted immediately
    /// (when enough of the sector remains that it cannot be the
    /// penultimate block) or withheld in case it turns out to be the
    /// sector's penultimate block, needed for ciphertext stealing. The
    /// tweak always advances exactly once here, regardless of which
    /// path is taken.
    fn handle_full_block(&mut self, out: &mut [u8], out_pos: &mut usize) -> Result<(), CipherError> {
        let block = self.partial_buf;
        self.partial_len = 0;
        let block_tweak = self.current_tweak;
        let remaining_after = self.params.sector_size() - self.sector_offset;

        if remaining_after > BLOCK_SIZE {
            let processed = self.process_block(&block, &block_tweak);
            emit(out, out_pos, &processed)?;
        } else {
            if let Some((prev_block, prev_tweak)) = self.withheld.take() {
                let processed = self.process_block(&prev_block, &prev_tweak);
                emit(out, out_pos, &processed)?;
            }
            self.withheld = Some((block, block_tweak));
        }

        gf128::advance(&mut self.current_tweak);
        Ok(())
    }

    /// End the current sector, whose *actual* consumed length is
    /// `effective_len` — `sector_size` for an in-stream sector boundary,
    /// or `sector_offset` for a stream that ends mid-sector. Emits the
    /// withheld block normally if `effective_len` is block-aligned, or
    /// applies ciphertext stealing against the pending partial tail
    /// otherwise.
    fn finish_sector(&mut self, effective_len: usize, out: &mut [u8], out_pos: &mut usize) -> Result<(), CipherError> {
        let r = effective_len % BLOCK_SIZE;
        if r == 0 {
            if let Some((block, tweak)) = self.withheld.take() {
                let processed = self.process_block(&block, &tweak);
                emit(out, out_pos, &processed)?;
            }
            return Ok(());
        }

        let (withheld_block, withheld_tweak) = self.withheld.take().unwrap_or_else(|| {
            unreachable!("a non-aligned sector always withholds its penultimate block before the tail arrives")
        });
        let tail = self.partial_buf;
        let next_tweak = self.current_tweak;
        trace!(tail_len = r, "applying ciphertext stealing");
        let (first, second) = self.apply_cts(&withheld_block, &withheld_tweak, &tail[..r], &next_tweak);
        emit(out, out_pos, &first)?;
        emit(out, out_pos, &second[..r])?;
        Ok(())
    }

    /// Ciphertext stealing, encryption and decryption directions.
    /// `withheld`/`t_prev` are the penultimate block and its own tweak;
    /// `tail` is the r-byte partial final block; `t_next` is
    /// `advance(t_prev)`, the tweak the partial block would have used.
    /// Returns `(first_16_bytes_to_emit, second_block_whose_first_r_bytes_are_meaningful)`.
    fn apply_cts(
        &self,
        withheld: &[u8; BLOCK_SIZE],
        t_prev: &[u8; BLOCK_SIZE],
        tail: &[u8],
        t_next: &[u8; BLOCK_SIZE],
    ) -> ([u8; BLOCK_SIZE], [u8; BLOCK_SIZE]) {
        let r = tail.len();
        if self.for_encryption {
            let cc = xts_encrypt_block(&self.aes_data, withheld, t_prev);
            let mut pp = [0u8; BLOCK_SIZE];
            pp[..r].copy_from_slice(tail);
            pp[r..].copy_from_slice(&cc[r..]);
            let c_nm1 = xts_encrypt_block(&self.aes_data, &pp, t_next);
            let mut c_n = [0u8; BLOCK_SIZE];
            c_n[..r].copy_from_slice(&cc[..r]);
            (c_nm1, c_n)
        } else {
            let pp = xts_decrypt_block(&self.aes_data, withheld, t_next);
            let mut cc = [0u8; BLOCK_SIZE];
            cc[..r].copy_from_slice(tail);
            cc[r..].copy_from_slice(&pp[r..]);
            let p_nm1 = xts_decrypt_block(&self.aes_data, &cc, t_prev);
            let mut p_n = [0u8; BLOCK_SIZE];
            p_n[..r].copy_from_slice(&pp[..r]);
            (p_nm1, p_n)
        }
    }

    fn advance_to_next_sector(&mut self) -> Result<(), CipherError> {
        let next = self.current_sector.checked_add(1).ok_or_else(|| {
            CipherError::Configuration("sector index overflowed 128 bits".into())
        })?;
        self.current_sector = next;
        self.sector_offset = 0;
        self.current_tweak = self.initial_tweak(next);
        Ok(())
    }
}

fn emit(out: &mut [u8], out_pos: &mut usize, bytes: &[u8]) -> Result<(), CipherError> {
    let available = out.len().saturating_sub(*out_pos);
    if available < bytes.len() {
        return Err(CipherError::OutputBufferTooSmall {
            needed: *out_pos + bytes.len(),
            available: out.len(),
        });
    }
    out[*out_pos..*out_pos + bytes.len()].copy_from_slice(bytes);
    *out_pos += bytes.len();
    Ok(())
}

impl Drop for XtsCipher {
    fn drop(&mut self) {
        self.current_tweak.zeroize();
        self.partial_buf.zeroize();
        if let Some((block, tweak)) = self.withheld.as_mut() {
            block.zeroize();
            tweak.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CipherParameters;

    fn cipher(for_encryption: bool, mode: Mode, sector_size: usize, sector_index: u128) -> XtsCipher {
        XtsCipher::new(
            for_encryption,
            CipherParameters::new(mode, &[0x11u8; 16], &[0x22u8; 16], sector_size, sector_index).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn aligned_sector_roundtrips_in_one_call() {
        let mut enc = cipher(true, Mode::Continuous, 32, 0);
        let plaintext = [0x5au8; 32];
        let mut ciphertext = [0u8; 48];
        let mut n = enc.process(&plaintext, &mut ciphertext).unwrap();
        n += enc.finalize(&mut ciphertext[n..]).unwrap();
        assert_eq!(n, 32);

        let mut dec = cipher(false, Mode::Continuous, 32, 0);
        let mut recovered = [0u8; 48];
        let mut m = dec.process(&ciphertext[..32], &mut recovered).unwrap();
        m += dec.finalize(&mut recovered[m..]).unwrap();
        assert_eq!(m, 32);
        assert_eq!(&recovered[..32], &plaintext[..]);
    }

    #[test]
    fn non_aligned_sector_roundtrips_via_cts() {
        for sector_size in [17usize, 31, 33, 47] {
            let mut enc = cipher(true, Mode::Continuous, sector_size, 0);
            let plaintext: Vec<u8> = (0..sector_size as u8).collect();
            let mut ciphertext = vec![0u8; sector_size + 16];
            let mut n = enc.process(&plaintext, &mut ciphertext).unwrap();
            n += enc.finalize(&mut ciphertext[n..]).unwrap();
            assert_eq!(n, sector_size, "sector_size={sector_size}");

            let mut dec = cipher(false, Mode::Continuous, sector_size, 0);
            let mut recovered = vec![0u8; sector_size + 16];
            let mut m = dec.process(&ciphertext[..sector_size], &mut recovered).unwrap();
            m += dec.finalize(&mut recovered[m..]).unwrap();
            assert_eq!(&recovered[..sector_size], &plaintext[..], "sector_size={sector_size}");
        }
    }

    #[test]
    fn chunking_does_not_change_the_result() {
        let plaintext: Vec<u8> = (0..47u8).collect();

        let mut whole = cipher(true, Mode::Continuous, 47, 0);
        let mut whole_out = vec![0u8; 64];
        let mut n = whole.process(&plaintext, &mut whole_out).unwrap();
        n += whole.finalize(&mut whole_out[n..]).unwrap();

        let mut chunked = cipher(true, Mode::Continuous, 47, 0);
        let mut chunked_out = vec![0u8; 64];
        let mut m = 0;
        for chunk in [&plaintext[..5], &plaintext[5..16], &plaintext[16..31], &plaintext[31..]] {
            m += chunked.process(chunk, &mut chunked_out[m..]).unwrap();
        }
        m += chunked.finalize(&mut chunked_out[m..]).unwrap();

        assert_eq!(n, m);
        assert_eq!(whole_out[..n], chunked_out[..m]);
    }

    #[test]
    fn continuous_mode_advances_tweak_across_sectors() {
        let mut a = cipher(true, Mode::Continuous, 32, 5);
        let mut b = cipher(true, Mode::Continuous, 32, 5);

        let plaintext_a = [0xaau8; 64];
        let mut plaintext_b = plaintext_a;
        plaintext_b[33] ^= 0xff;

        let mut out_a = vec![0u8; 80];
        let mut out_b = vec![0u8; 80];
        let mut na = a.process(&plaintext_a, &mut out_a).unwrap();
        na += a.finalize(&mut out_a[na..]).unwrap();
        let mut nb = b.process(&plaintext_b, &mut out_b).unwrap();
        nb += b.finalize(&mut out_b[nb..]).unwrap();

        assert_eq!(na, nb);
        assert_eq!(out_a[..32], out_b[..32], "sector 0 must be unaffected by a change in sector 1");
        assert_ne!(out_a[32..64], out_b[32..64]);
    }

    #[test]
    fn independent_mode_rejects_crossing_a_sector_boundary() {
        let mut enc = cipher(true, Mode::Independent, 32, 0);
        let mut out = vec![0u8; 80];
        let err = enc.process(&[0u8; 48], &mut out).unwrap_err();
        assert!(matches!(err, CipherError::SizeMismatch { .. }));
    }

    /// Same as the above, but with a sector size that is not a multiple of
    /// 16: `sector_offset` never lands exactly on `sector_size` block-aligned,
    /// so the crossing must still be caught from `process()` itself rather
    /// than only surfacing (or panicking) once more blocks are consumed.
    #[test]
    fn independent_mode_rejects_crossing_a_non_aligned_sector_boundary() {
        let mut enc = cipher(true, Mode::Independent, 17, 0);
        let mut out = vec![0u8; 64];
        let err = enc.process(&[0u8; 30], &mut out).unwrap_err();
        assert!(matches!(err, CipherError::SizeMismatch { expected: 17, actual: 30 }));
    }

    /// A single `process()` call whose input runs past a non-aligned
    /// sector's end and into the next sector must stop consuming exactly at
    /// the sector boundary (not overrun `sector_offset` past `sector_size`),
    /// apply CTS for the first sector, and pick up the remainder as the
    /// start of the next sector — matching what the same bytes fed as two
    /// separate `process()` calls would produce.
    #[test]
    fn one_call_spanning_a_non_aligned_sector_boundary_matches_two_calls() {
        let plaintext: Vec<u8> = (0..20u8).collect();

        let mut one_shot = cipher(true, Mode::Continuous, 17, 0);
        let mut one_shot_out = vec![0u8; 48];
        let mut n = one_shot.process(&plaintext, &mut one_shot_out).unwrap();
        n += one_shot.finalize(&mut one_shot_out[n..]).unwrap();

        let mut split = cipher(true, Mode::Continuous, 17, 0);
        let mut split_out = vec![0u8; 48];
        let mut m = split.process(&plaintext[..17], &mut split_out).unwrap();
        m += split.process(&plaintext[17..], &mut split_out[m..]).unwrap();
        m += split.finalize(&mut split_out[m..]).unwrap();

        assert_eq!(n, m);
        assert_eq!(one_shot_out[..n], split_out[..m]);
    }

    #[test]
    fn independent_mode_rejects_incomplete_sector_at_finalize() {
        let mut enc = cipher(true, Mode::Independent, 32, 0);
        let mut out = vec![0u8; 48];
        enc.process(&[0u8; 20], &mut out).unwrap();
        let err = enc.finalize(&mut out).unwrap_err();
        assert!(matches!(err, CipherError::SizeMismatch { .. }));
    }

    #[test]
    fn finalize_with_fewer_than_16_bytes_is_insufficient_data() {
        let mut enc = cipher(true, Mode::Continuous, 32, 0);
        let mut out = vec![0u8; 32];
        enc.process(&[0u8; 8], &mut out).unwrap();
        let err = enc.finalize(&mut out).unwrap_err();
        assert!(matches!(err, CipherError::InsufficientData { consumed: 8 }));
    }

    #[test]
    fn finalize_on_a_clean_sector_boundary_emits_nothing() {
        let mut enc = cipher(true, Mode::Continuous, 16, 0);
        let mut out = vec![0u8; 32];
        let n = enc.process(&[0u8; 16], &mut out).unwrap();
        assert_eq!(n, 16);
        let n = enc.finalize(&mut out).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn process_after_finalize_is_a_lifecycle_error() {
        let mut enc = cipher(true, Mode::Continuous, 16, 0);
        let mut out = vec![0u8; 32];
        enc.process(&[0u8; 16], &mut out).unwrap();
        enc.finalize(&mut out).unwrap();
        let err = enc.process(&[0u8], &mut out).unwrap_err();
        assert!(matches!(err, CipherError::Lifecycle(_)));
    }

    #[test]
    fn reinit_then_decrypt_recovers_the_original_encrypted_text() {
        let params = || CipherParameters::new(Mode::Continuous, &[0x99u8; 32], &[0x77u8; 32], 32, 0).unwrap();
        let mut cipher = XtsCipher::new(true, params()).unwrap();
        let plaintext = [0x42u8; 32];
        let mut ciphertext = [0u8; 48];
        let mut n = cipher.process(&plaintext, &mut ciphertext).unwrap();
        n += cipher.finalize(&mut ciphertext[n..]).unwrap();

        cipher.reinit(false, params()).unwrap();
        let mut recovered = [0u8; 48];
        let mut m = cipher.process(&ciphertext[..n], &mut recovered).unwrap();
        m += cipher.finalize(&mut recovered[m..]).unwrap();
        assert_eq!(&recovered[..m], &plaintext[..]);
    }

    #[test]
    fn output_size_matches_the_documented_contract() {
        let enc = cipher(true, Mode::Continuous, 32, 0);
        assert_eq!(enc.output_size(10), 26);
    }

    #[test]
    fn process_byte_drives_the_same_state_machine_as_process() {
        let mut enc = cipher(true, Mode::Continuous, 16, 0);
        let mut whole_out = vec![0u8; 32];
        let n = enc.process(&[7u8; 16], &mut whole_out).unwrap();

        let mut byte_enc = cipher(true, Mode::Continuous, 16, 0);
        let mut byte_out = vec![0u8; 32];
        let mut m = 0;
        for &b in &[7u8; 16] {
            m += byte_enc.process_byte(b, &mut byte_out[m..]).unwrap();
        }
        assert_eq!(n, m);
        assert_eq!(whole_out[..n], byte_out[..m]);
    }
}
