use crate::pir_internals::{branch_opt_util, error::PhocaPIRError, params::Parameters};

/// Plaintext slot holding item `elem_index`.
#[inline(always)]
pub fn fv_index(params: &Parameters, elem_index: usize) -> usize {
    elem_index / params.items_per_plaintext()
}

/// Position of item `elem_index` inside its plaintext slot. For every valid index,
/// `fv_index * items_per_plaintext + fv_offset == elem_index`.
#[inline(always)]
pub fn fv_offset(params: &Parameters, elem_index: usize) -> usize {
    elem_index % params.items_per_plaintext()
}

/// Decomposes a plaintext slot into its `d` mixed-radix digits `(c_1, ..., c_d)` with
/// `c_k < n_k`; digit `k` has place value `n_(k+1) * ... * n_d`.
pub fn compute_indices(params: &Parameters, plaintext_slot: usize) -> Vec<usize> {
    let mut digits = Vec::with_capacity(params.dimension_count());
    let mut place = params.padded_plaintext_count();
    let mut remaining = plaintext_slot;

    for &dim_size in params.dimension_sizes() {
        place /= dim_size;
        digits.push(remaining / place);
        remaining %= place;
    }

    digits
}

/// Per-dimension inverse of the oblivious-expansion scale `2^ceil(log2 m)`, modulo the
/// engine's plaintext modulus. `m` is the size of the expansion batch holding the target
/// digit, so only the batch the digit actually lands in matters.
pub fn inverse_scales(params: &Parameters, digits: &[usize], plain_modulus: u64) -> Result<Vec<u64>, PhocaPIRError> {
    digits
        .iter()
        .enumerate()
        .map(|(dim, &digit)| {
            let batch = digit / params.poly_degree();
            let batch_size = params.expansion_batch_size(dim, batch);
            let scale = 1u64 << log2_ceil(batch_size);

            match mod_inverse(scale % plain_modulus, plain_modulus) {
                Some(inverse) => Ok(inverse),
                None => {
                    branch_opt_util::cold();
                    Err(PhocaPIRError::ScaleNotInvertible)
                }
            }
        })
        .collect()
}

/// `ceil(log2 m)` for `m >= 1`.
#[inline(always)]
pub fn log2_ceil(m: usize) -> usize {
    m.next_power_of_two().trailing_zeros() as usize
}

/// Multiplicative inverse of `a` modulo `modulus` via the extended Euclidean algorithm,
/// or `None` if `gcd(a, modulus) != 1`.
pub fn mod_inverse(a: u64, modulus: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128, modulus as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }

    if old_r == 1 { Some(old_s.rem_euclid(modulus as i128) as u64) } else { None }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(2; "two dims")]
    #[test_case(3; "three dims")]
    fn fv_mapping_is_consistent(dimension_count: usize) {
        let params = Parameters::new(500, 24, 256, 12, dimension_count).unwrap();

        for elem_index in 0..params.num_items() {
            let index = fv_index(&params, elem_index);
            let offset = fv_offset(&params, elem_index);

            assert!(index < params.num_plaintexts());
            assert!(offset < params.items_per_plaintext());
            assert_eq!(index * params.items_per_plaintext() + offset, elem_index);
        }
    }

    #[test_case(2; "two dims")]
    #[test_case(3; "three dims")]
    fn mixed_radix_digits_reconstruct_slot(dimension_count: usize) {
        let params = Parameters::new(500, 24, 256, 12, dimension_count).unwrap();

        for slot in 0..params.num_plaintexts() {
            let digits = compute_indices(&params, slot);
            assert_eq!(digits.len(), dimension_count);

            let mut reconstructed = 0;
            for (digit, &dim_size) in digits.iter().zip(params.dimension_sizes()) {
                assert!(*digit < dim_size);
                reconstructed = reconstructed * dim_size + digit;
            }
            assert_eq!(reconstructed, slot);
        }
    }

    #[test]
    fn modular_inverse_round_trips() {
        const MODULUS: u64 = 4097;

        for a in 1..MODULUS {
            if let Some(inverse) = mod_inverse(a, MODULUS) {
                assert_eq!((a as u128 * inverse as u128) % MODULUS as u128, 1);
            }
        }

        assert_eq!(mod_inverse(2, 4096), None);
    }

    #[test]
    fn log2_ceil_boundaries() {
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(4), 2);
        assert_eq!(log2_ceil(5), 3);
        assert_eq!(log2_ceil(1024), 10);
    }

    #[test]
    fn scales_are_invertible_for_odd_modulus() {
        let params = Parameters::new(300, 16, 16, 8, 2).unwrap();
        let plain_modulus = (1u64 << 8) + 1;

        for slot in 0..params.num_plaintexts() {
            let digits = compute_indices(&params, slot);
            let scales = inverse_scales(&params, &digits, plain_modulus).unwrap();

            for (dim, (&digit, scale)) in digits.iter().zip(scales).enumerate() {
                let batch = digit / params.poly_degree();
                let m = params.expansion_batch_size(dim, batch);
                let forward = (1u64 << log2_ceil(m)) % plain_modulus;
                assert_eq!((forward as u128 * scale as u128) % plain_modulus as u128, 1);
            }
        }
    }

    #[test]
    fn even_modulus_is_rejected() {
        let params = Parameters::new(64, 16, 256, 12, 2).unwrap();
        let digits = compute_indices(&params, 0);

        assert_eq!(inverse_scales(&params, &digits, 1 << 12), Err(PhocaPIRError::ScaleNotInvertible));
    }
}
