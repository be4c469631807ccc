//! A reference [`HeEngine`] with no encryption.
//!
//! `PlainEngine` runs every homomorphic operation directly on coefficient vectors over
//! the negacyclic ring `Z_t[x] / (x^N + 1)`, with `t = 2^plain_modulus_bit_len + 1`
//! (odd, so oblivious-expansion scales are always invertible). Ciphertexts are just
//! polynomials carrying a random key tag, which makes key ownership observable: mixing
//! material from different keypairs fails, and rotations demand keys covering the
//! requested Galois element.
//!
//! This provides **no confidentiality whatsoever**. It exists so the protocol's ring
//! algebra, expansion, folding and wire formats can be exercised end-to-end in tests,
//! benches and documentation without a real HE backend.

use crate::{
    engine::{HeEngine, Plaintext},
    pir_internals::{branch_opt_util, error::PhocaPIRError, params::Parameters},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Tag carried by ciphertexts rebuilt from already-decrypted material
/// (`compose_to_ciphertext`); accepted by any secret key.
const NEUTRAL_KEY_TAG: u64 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainCiphertext {
    key_tag: u64,
    coeffs: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct PlainPublicKey {
    key_tag: u64,
}

#[derive(Clone, Debug)]
pub struct PlainSecretKey {
    key_tag: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainRotationKeys {
    key_tag: u64,
    galois_elts: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct PlainEngine {
    poly_degree: usize,
    plain_modulus: u64,
    plain_modulus_bit_len: usize,
}

impl PlainEngine {
    pub fn new(params: &Parameters) -> PlainEngine {
        PlainEngine {
            poly_degree: params.poly_degree(),
            plain_modulus: (1u64 << params.plain_modulus_bit_len()) + 1,
            plain_modulus_bit_len: params.plain_modulus_bit_len(),
        }
    }

    fn check_coeff_count(&self, coeff_count: usize) -> Result<(), PhocaPIRError> {
        if branch_opt_util::likely(coeff_count == self.poly_degree) {
            Ok(())
        } else {
            Err(PhocaPIRError::InvalidPlaintextLength)
        }
    }

    /// Schoolbook negacyclic convolution: `x^N == -1`.
    fn negacyclic_multiply(&self, lhs: &[u64], rhs: &[u64]) -> Vec<u64> {
        let n = self.poly_degree;
        let t = self.plain_modulus as u128;
        let mut res = vec![0u64; n];

        for (i, &a) in lhs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in rhs.iter().enumerate() {
                if b == 0 {
                    continue;
                }

                let product = (a as u128 * b as u128) % t;
                let exponent = i + j;
                if exponent < n {
                    res[exponent] = ((res[exponent] as u128 + product) % t) as u64;
                } else {
                    res[exponent - n] = ((res[exponent - n] as u128 + t - product) % t) as u64;
                }
            }
        }

        res
    }

    /// The automorphism `x -> x^galois_elt`; exponents wrap negacyclically over `2N`.
    fn automorphism(&self, coeffs: &[u64], galois_elt: u32) -> Vec<u64> {
        let n = self.poly_degree;
        let two_n = n << 1;
        let t = self.plain_modulus;
        let mut res = vec![0u64; n];

        for (i, &c) in coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }

            let exponent = (i * galois_elt as usize) % two_n;
            if exponent < n {
                res[exponent] = (res[exponent] + c) % t;
            } else {
                res[exponent - n] = (res[exponent - n] + t - c) % t;
            }
        }

        res
    }

    fn monomial_shift(&self, coeffs: &[u64], power: usize) -> Vec<u64> {
        let n = self.poly_degree;
        let two_n = n << 1;
        let t = self.plain_modulus;
        let mut res = vec![0u64; n];

        for (i, &c) in coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }

            let exponent = (i + power) % two_n;
            if exponent < n {
                res[exponent] = (res[exponent] + c) % t;
            } else {
                res[exponent - n] = (res[exponent - n] + t - c) % t;
            }
        }

        res
    }

    /// Coefficients come back split into a low/high bit pair, so one ciphertext
    /// decomposes into two plaintexts.
    fn low_bit_count(&self) -> usize {
        self.plain_modulus_bit_len / 2 + 1
    }
}

impl HeEngine for PlainEngine {
    type Ciphertext = PlainCiphertext;
    type PublicKey = PlainPublicKey;
    type SecretKey = PlainSecretKey;
    type RotationKeys = PlainRotationKeys;

    #[inline(always)]
    fn poly_degree(&self) -> usize {
        self.poly_degree
    }

    #[inline(always)]
    fn plain_modulus(&self) -> u64 {
        self.plain_modulus
    }

    #[inline(always)]
    fn expansion_ratio(&self) -> usize {
        2
    }

    fn generate_keypair(&self) -> Result<(PlainPublicKey, PlainSecretKey), PhocaPIRError> {
        let mut rng = ChaCha8Rng::from_os_rng();
        let key_tag = loop {
            let candidate = rng.random::<u64>();
            if candidate != NEUTRAL_KEY_TAG {
                break candidate;
            }
        };

        Ok((PlainPublicKey { key_tag }, PlainSecretKey { key_tag }))
    }

    fn generate_rotation_keys(&self, secret_key: &PlainSecretKey, galois_elts: &[u32]) -> Result<PlainRotationKeys, PhocaPIRError> {
        Ok(PlainRotationKeys {
            key_tag: secret_key.key_tag,
            galois_elts: galois_elts.to_vec(),
        })
    }

    fn encrypt(&self, public_key: &PlainPublicKey, plaintext: &Plaintext) -> Result<PlainCiphertext, PhocaPIRError> {
        self.check_coeff_count(plaintext.coeff_count())?;

        let t = self.plain_modulus;
        Ok(PlainCiphertext {
            key_tag: public_key.key_tag,
            coeffs: plaintext.coeffs().iter().map(|&c| c % t).collect(),
        })
    }

    fn decrypt(&self, secret_key: &PlainSecretKey, ciphertext: &PlainCiphertext) -> Result<Plaintext, PhocaPIRError> {
        if branch_opt_util::unlikely(ciphertext.key_tag != secret_key.key_tag && ciphertext.key_tag != NEUTRAL_KEY_TAG) {
            return Err(PhocaPIRError::CiphertextKeyMismatch);
        }

        Ok(Plaintext::from_coeffs(ciphertext.coeffs.clone()))
    }

    fn add(&self, lhs: &PlainCiphertext, rhs: &PlainCiphertext) -> Result<PlainCiphertext, PhocaPIRError> {
        if branch_opt_util::unlikely(lhs.key_tag != rhs.key_tag) {
            return Err(PhocaPIRError::CiphertextKeyMismatch);
        }

        let t = self.plain_modulus;
        Ok(PlainCiphertext {
            key_tag: lhs.key_tag,
            coeffs: lhs.coeffs.iter().zip(&rhs.coeffs).map(|(&a, &b)| (a + b) % t).collect(),
        })
    }

    fn multiply_plain(&self, ciphertext: &PlainCiphertext, plaintext: &Plaintext) -> Result<PlainCiphertext, PhocaPIRError> {
        self.check_coeff_count(plaintext.coeff_count())?;

        Ok(PlainCiphertext {
            key_tag: ciphertext.key_tag,
            coeffs: self.negacyclic_multiply(&ciphertext.coeffs, plaintext.coeffs()),
        })
    }

    fn apply_galois(&self, ciphertext: &PlainCiphertext, galois_elt: u32, keys: &PlainRotationKeys) -> Result<PlainCiphertext, PhocaPIRError> {
        if branch_opt_util::unlikely(keys.key_tag != ciphertext.key_tag) {
            return Err(PhocaPIRError::CiphertextKeyMismatch);
        }
        if branch_opt_util::unlikely(!keys.galois_elts.contains(&galois_elt)) {
            return Err(PhocaPIRError::GaloisElementNotInKeys(galois_elt));
        }

        Ok(PlainCiphertext {
            key_tag: ciphertext.key_tag,
            coeffs: self.automorphism(&ciphertext.coeffs, galois_elt),
        })
    }

    fn multiply_power_of_x(&self, ciphertext: &PlainCiphertext, power: usize) -> Result<PlainCiphertext, PhocaPIRError> {
        Ok(PlainCiphertext {
            key_tag: ciphertext.key_tag,
            coeffs: self.monomial_shift(&ciphertext.coeffs, power % (self.poly_degree << 1)),
        })
    }

    // This engine has no evaluation domain, every operation runs on raw coefficients.
    fn transform_plain_to_ntt(&self, _plaintext: &mut Plaintext) {}
    fn transform_to_ntt(&self, _ciphertext: &mut PlainCiphertext) {}
    fn transform_from_ntt(&self, _ciphertext: &mut PlainCiphertext) {}

    fn decompose_to_plaintexts(&self, ciphertext: &PlainCiphertext) -> Vec<Plaintext> {
        let low_bits = self.low_bit_count();
        let low_mask = (1u64 << low_bits) - 1;

        let low = ciphertext.coeffs.iter().map(|&c| c & low_mask).collect();
        let high = ciphertext.coeffs.iter().map(|&c| c >> low_bits).collect();

        vec![Plaintext::from_coeffs(low), Plaintext::from_coeffs(high)]
    }

    fn compose_to_ciphertext(&self, plaintexts: &[Plaintext]) -> Result<PlainCiphertext, PhocaPIRError> {
        if branch_opt_util::unlikely(plaintexts.len() != self.expansion_ratio()) {
            return Err(PhocaPIRError::InvalidPlaintextLength);
        }
        self.check_coeff_count(plaintexts[0].coeff_count())?;
        self.check_coeff_count(plaintexts[1].coeff_count())?;

        let low_bits = self.low_bit_count();
        let t = self.plain_modulus;
        let coeffs = plaintexts[0]
            .coeffs()
            .iter()
            .zip(plaintexts[1].coeffs())
            .map(|(&low, &high)| (low + (high << low_bits)) % t)
            .collect();

        Ok(PlainCiphertext {
            key_tag: NEUTRAL_KEY_TAG,
            coeffs,
        })
    }

    #[inline(always)]
    fn ciphertext_byte_len(&self) -> usize {
        std::mem::size_of::<u64>() * (1 + self.poly_degree)
    }

    fn serialize_ciphertext(&self, ciphertext: &PlainCiphertext) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.ciphertext_byte_len());
        bytes.extend_from_slice(&ciphertext.key_tag.to_le_bytes());
        for &coeff in &ciphertext.coeffs {
            bytes.extend_from_slice(&coeff.to_le_bytes());
        }

        bytes
    }

    fn deserialize_ciphertext(&self, bytes: &[u8]) -> Result<PlainCiphertext, PhocaPIRError> {
        if branch_opt_util::unlikely(bytes.len() != self.ciphertext_byte_len()) {
            return Err(PhocaPIRError::CiphertextBufferLengthMismatch);
        }

        let key_tag = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        let t = self.plain_modulus;
        let coeffs = bytes[8..].chunks_exact(8).map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()) % t).collect();

        Ok(PlainCiphertext { key_tag, coeffs })
    }

    fn serialize_rotation_keys(&self, keys: &PlainRotationKeys) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 4 * keys.galois_elts.len());
        bytes.extend_from_slice(&keys.key_tag.to_le_bytes());
        for &galois_elt in &keys.galois_elts {
            bytes.extend_from_slice(&galois_elt.to_le_bytes());
        }

        bytes
    }

    fn deserialize_rotation_keys(&self, bytes: &[u8]) -> Result<PlainRotationKeys, PhocaPIRError> {
        if branch_opt_util::unlikely(bytes.len() < 8 || (bytes.len() - 8) % 4 != 0) {
            return Err(PhocaPIRError::TruncatedSerializedBuffer);
        }

        let key_tag = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        let galois_elts = bytes[8..].chunks_exact(4).map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap())).collect();

        Ok(PlainRotationKeys { key_tag, galois_elts })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_engine(poly_degree: usize, plain_modulus_bit_len: usize) -> PlainEngine {
        let params = Parameters::new(16, 2, poly_degree, plain_modulus_bit_len, 2).unwrap();
        PlainEngine::new(&params)
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let engine = test_engine(16, 8);
        let (public_key, secret_key) = engine.generate_keypair().unwrap();

        let plaintext = Plaintext::from_coeffs((0..16).collect());
        let ciphertext = engine.encrypt(&public_key, &plaintext).unwrap();

        assert_eq!(engine.decrypt(&secret_key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn foreign_key_material_is_rejected() {
        let engine = test_engine(16, 8);
        let (public_key, _) = engine.generate_keypair().unwrap();
        let (_, other_secret_key) = engine.generate_keypair().unwrap();

        let ciphertext = engine.encrypt(&public_key, &Plaintext::zero(16)).unwrap();

        assert_eq!(engine.decrypt(&other_secret_key, &ciphertext), Err(PhocaPIRError::CiphertextKeyMismatch));
    }

    #[test]
    fn negacyclic_wrap_negates() {
        let engine = test_engine(4, 8);
        let t = engine.plain_modulus();
        let (public_key, secret_key) = engine.generate_keypair().unwrap();

        // x^3 * x^2 == x^5 == -x over x^4 + 1
        let ciphertext = engine.encrypt(&public_key, &Plaintext::from_coeffs(vec![0, 0, 0, 1])).unwrap();
        let mut monomial = Plaintext::zero(4);
        monomial.coeffs_mut()[2] = 1;

        let product = engine.multiply_plain(&ciphertext, &monomial).unwrap();
        assert_eq!(engine.decrypt(&secret_key, &product).unwrap().coeffs(), &[0, t - 1, 0, 0]);
    }

    #[test]
    fn automorphism_matches_substitution() {
        let engine = test_engine(4, 8);
        let t = engine.plain_modulus();
        let (public_key, secret_key) = engine.generate_keypair().unwrap();
        let keys = engine.generate_rotation_keys(&secret_key, &[5]).unwrap();

        // p(x) = 1 + x; p(x^5) = 1 + x^5 = 1 - x over x^4 + 1
        let ciphertext = engine.encrypt(&public_key, &Plaintext::from_coeffs(vec![1, 1, 0, 0])).unwrap();
        let rotated = engine.apply_galois(&ciphertext, 5, &keys).unwrap();

        assert_eq!(engine.decrypt(&secret_key, &rotated).unwrap().coeffs(), &[1, t - 1, 0, 0]);
    }

    #[test]
    fn missing_galois_element_is_rejected() {
        let engine = test_engine(4, 8);
        let (public_key, secret_key) = engine.generate_keypair().unwrap();
        let keys = engine.generate_rotation_keys(&secret_key, &[5]).unwrap();

        let ciphertext = engine.encrypt(&public_key, &Plaintext::zero(4)).unwrap();

        assert_eq!(engine.apply_galois(&ciphertext, 3, &keys), Err(PhocaPIRError::GaloisElementNotInKeys(3)));
    }

    #[test]
    fn decompose_compose_round_trip() {
        let engine = test_engine(8, 12);
        let (public_key, secret_key) = engine.generate_keypair().unwrap();

        let plaintext = Plaintext::from_coeffs(vec![0, 1, 4095, 4096, 17, 2048, 3000, 9]);
        let ciphertext = engine.encrypt(&public_key, &plaintext).unwrap();

        let pieces = engine.decompose_to_plaintexts(&ciphertext);
        assert_eq!(pieces.len(), engine.expansion_ratio());

        let composed = engine.compose_to_ciphertext(&pieces).unwrap();
        assert_eq!(engine.decrypt(&secret_key, &composed).unwrap(), plaintext);
    }

    #[test]
    fn ciphertext_serialization_is_fixed_size() {
        let engine = test_engine(16, 10);
        let (public_key, _) = engine.generate_keypair().unwrap();

        let ciphertext = engine.encrypt(&public_key, &Plaintext::from_coeffs((0..16).collect())).unwrap();
        let bytes = engine.serialize_ciphertext(&ciphertext);

        assert_eq!(bytes.len(), engine.ciphertext_byte_len());
        assert_eq!(engine.deserialize_ciphertext(&bytes).unwrap(), ciphertext);
        assert_eq!(engine.deserialize_ciphertext(&bytes[1..]), Err(PhocaPIRError::CiphertextBufferLengthMismatch));
    }

    #[test]
    fn rotation_key_serialization_round_trips() {
        let engine = test_engine(16, 10);
        let (_, secret_key) = engine.generate_keypair().unwrap();
        let keys = engine.generate_rotation_keys(&secret_key, &[17, 9, 5, 3]).unwrap();

        let bytes = engine.serialize_rotation_keys(&keys);
        assert_eq!(engine.deserialize_rotation_keys(&bytes).unwrap(), keys);
        assert_eq!(engine.deserialize_rotation_keys(&bytes[..7]), Err(PhocaPIRError::TruncatedSerializedBuffer));
    }
}
