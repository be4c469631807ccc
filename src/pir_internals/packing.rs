//! Conversion between raw item bytes and plaintext coefficients.
//!
//! Bytes are packed bit-contiguously, little-endian, `coeff_bit_len` bits per
//! coefficient, so items inside one plaintext slot start at byte offset
//! `fv_offset * item_bytes` of the unpacked stream regardless of coefficient
//! alignment.

use std::cmp::min;

/// Packs bytes into `coeff_bit_len`-bit coefficients.
///
/// # Arguments
///
/// * `coeff_bit_len` - The number of usable bits per coefficient, at most 32.
/// * `bytes` - The bytes to pack.
///
/// # Returns
///
/// A vector of `ceil(len(bytes) * 8 / coeff_bit_len)` coefficients, each below
/// `2^coeff_bit_len`.
pub fn bytes_to_coeffs(coeff_bit_len: usize, bytes: &[u8]) -> Vec<u64> {
    let coeff_mask = (1u64 << coeff_bit_len) - 1;
    let mut coeffs = Vec::with_capacity((bytes.len() * 8).div_ceil(coeff_bit_len));

    let mut buffer = 0u64;
    let mut buf_num_bits = 0usize;

    let mut byte_offset = 0;
    while byte_offset < bytes.len() {
        let remaining_num_bytes = bytes.len() - byte_offset;
        let fillable_num_bytes = min((64 - buf_num_bits) / 8, remaining_num_bytes);

        let till_byte_idx = byte_offset + fillable_num_bytes;
        let read_word = u64_from_le_bytes(&bytes[byte_offset..till_byte_idx]);
        byte_offset = till_byte_idx;

        buffer |= read_word << buf_num_bits;
        buf_num_bits += fillable_num_bytes * 8;

        while buf_num_bits >= coeff_bit_len {
            coeffs.push(buffer & coeff_mask);
            buffer >>= coeff_bit_len;
            buf_num_bits -= coeff_bit_len;
        }
    }

    if buf_num_bits > 0 {
        coeffs.push(buffer & coeff_mask);
    }

    coeffs
}

/// Unpacks `coeff_bit_len`-bit coefficients back into bytes, the inverse of
/// [`bytes_to_coeffs`].
///
/// # Arguments
///
/// * `coeff_bit_len` - The number of usable bits per coefficient, at most 32.
/// * `coeffs` - The coefficients to unpack; bits above `coeff_bit_len` are ignored.
/// * `out_byte_len` - The number of bytes to produce.
///
/// # Returns
///
/// A vector of exactly `out_byte_len` bytes, zero-padded if the coefficients run out.
pub fn coeffs_to_bytes(coeff_bit_len: usize, coeffs: &[u64], out_byte_len: usize) -> Vec<u8> {
    let coeff_mask = (1u64 << coeff_bit_len) - 1;
    let mut bytes = vec![0u8; out_byte_len];

    let mut buffer = 0u64;
    let mut buf_num_bits = 0usize;

    let mut byte_offset = 0;
    for &coeff in coeffs {
        if byte_offset >= out_byte_len {
            break;
        }

        buffer |= (coeff & coeff_mask) << buf_num_bits;
        buf_num_bits += coeff_bit_len;

        let drainable_num_bytes = min(buf_num_bits / 8, out_byte_len - byte_offset);
        u64_to_le_bytes(buffer, &mut bytes[byte_offset..byte_offset + drainable_num_bytes]);

        buffer >>= drainable_num_bytes * 8;
        buf_num_bits -= drainable_num_bytes * 8;
        byte_offset += drainable_num_bytes;
    }

    bytes
}

#[inline(always)]
fn u64_from_le_bytes(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

#[inline(always)]
fn u64_to_le_bytes(word: u64, bytes: &mut [u8]) {
    let le_repr = word.to_le_bytes();
    let writable_num_bytes = min(bytes.len(), le_repr.len());
    bytes[..writable_num_bytes].copy_from_slice(&le_repr[..writable_num_bytes]);
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn pack_and_recover_bytes() {
        const MIN_BYTE_LEN: usize = 1;
        const MAX_BYTE_LEN: usize = 256;

        const MIN_COEFF_BIT_LEN: usize = 1;
        const MAX_COEFF_BIT_LEN: usize = 32;

        let mut rng = ChaCha8Rng::from_os_rng();

        for byte_len in MIN_BYTE_LEN..=MAX_BYTE_LEN {
            for coeff_bit_len in MIN_COEFF_BIT_LEN..=MAX_COEFF_BIT_LEN {
                let mut bytes = vec![0u8; byte_len];
                rng.fill_bytes(&mut bytes);

                let coeffs = bytes_to_coeffs(coeff_bit_len, &bytes);
                assert_eq!(coeffs.len(), (byte_len * 8).div_ceil(coeff_bit_len));
                assert!(coeffs.iter().all(|&c| c < (1u64 << coeff_bit_len)));

                let recovered = coeffs_to_bytes(coeff_bit_len, &coeffs, byte_len);
                assert_eq!(bytes, recovered, "byte_len = {}, coeff_bit_len = {}", byte_len, coeff_bit_len);
            }
        }
    }

    #[test]
    fn unpacking_zero_pads_when_coefficients_run_out(){
        let coeffs = bytes_to_coeffs(12, &[0xAB, 0xCD]);
        let bytes = coeffs_to_bytes(12, &coeffs, 4);

        assert_eq!(&bytes[..2], &[0xAB, 0xCD]);
        assert_eq!(&bytes[2..], &[0, 0]);
    }
}
