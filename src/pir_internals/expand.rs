//! Oblivious query expansion.
//!
//! A packed query ciphertext encrypts a one-hot selection vector in its coefficient
//! slots. Expansion unpacks it, without learning anything about the selected slot, into
//! `m` ciphertexts where the `j`-th encrypts `2^ceil(log2 m)` times the `j`-th packed
//! coefficient. The scale is undone client-side during reply decoding.

use crate::{
    engine::{HeEngine, Plaintext},
    pir_internals::{error::PhocaPIRError, indexing},
};

/// Galois elements `(N + 2^i) / 2^i` for `i` in `[0, log2 N)`: the automorphism set the
/// expansion loop rotates through. Clients must generate rotation keys for exactly this
/// set.
pub fn expansion_galois_elements(poly_degree: usize) -> Vec<u32> {
    let log_n = poly_degree.trailing_zeros();
    (0..log_n).map(|i| (poly_degree as u32 + (1u32 << i)) / (1u32 << i)).collect()
}

/// Expands one packed ciphertext into `m` selection ciphertexts.
///
/// One doubling round per bit of `m`: round `i` splits every ciphertext into the
/// even/odd halves of its coefficient support using the automorphism `x -> x^(N/2^i + 1)`
/// and a negacyclic monomial shift by `2N - 2^i`. When `m` is not a power of two, the
/// final round's tail slots would land past `m`; those survivors are doubled in place
/// instead, keeping all `m` outputs on the same `2^ceil(log2 m)` scale.
///
/// # Arguments
///
/// * `engine` - The HE engine to operate through.
/// * `packed` - The packed query ciphertext; its coefficient support must lie in `[0, m)`.
/// * `m` - The number of selection ciphertexts to produce, `1 <= m <= poly_degree`.
/// * `keys` - Rotation keys covering [`expansion_galois_elements`].
///
/// # Returns
///
/// * `Result<Vec<E::Ciphertext>, PhocaPIRError>` - Exactly `m` ciphertexts, the `j`-th
///   encrypting `2^ceil(log2 m) * packed[j]` in its constant term.
pub fn expand_ciphertext<E: HeEngine>(engine: &E, packed: &E::Ciphertext, m: usize, keys: &E::RotationKeys) -> Result<Vec<E::Ciphertext>, PhocaPIRError> {
    debug_assert!(m >= 1 && m <= engine.poly_degree());

    if m == 1 {
        // nothing to unpack, and the scale 2^0 needs no correction
        return Ok(vec![packed.clone()]);
    }

    let n = engine.poly_degree();
    let galois_elts = expansion_galois_elements(n);
    let log_m = indexing::log2_ceil(m);
    let two = Plaintext::constant(n, 2);

    let mut temp = vec![packed.clone()];
    for i in 0..log_m {
        let galois_elt = galois_elts[i];
        let index_raw = (n << 1) - (1usize << i);
        let index = (index_raw * galois_elt as usize) % (n << 1);
        let last_round = i + 1 == log_m;
        // in the last round, the high sibling of slot `a` lands at `a + 2^i`, which for
        // `a >= m - 2^i` falls past `m` and is dropped
        let survivor_bound = m - (1usize << i);

        let mut firsts = Vec::with_capacity(temp.len());
        let mut seconds = Vec::with_capacity(temp.len());

        for (a, ciphertext) in temp.iter().enumerate() {
            if last_round && a >= survivor_bound {
                firsts.push(engine.multiply_plain(ciphertext, &two)?);
                continue;
            }

            let rotated = engine.apply_galois(ciphertext, galois_elt, keys)?;
            firsts.push(engine.add(ciphertext, &rotated)?);

            let shifted = engine.multiply_power_of_x(ciphertext, index_raw)?;
            let rotated_shifted = engine.multiply_power_of_x(&rotated, index)?;
            seconds.push(engine.add(&shifted, &rotated_shifted)?);
        }

        temp = firsts;
        temp.append(&mut seconds);
    }

    temp.truncate(m);
    Ok(temp)
}
