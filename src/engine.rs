//! The leveled homomorphic-encryption capability this crate is built on top of.
//!
//! The PIR protocol never looks inside a ciphertext: everything cryptographic is routed
//! through the [`HeEngine`] trait, and an engine implementation (a SEAL-style BFV
//! binding, or the in-tree [`crate::plain_engine::PlainEngine`] reference) supplies the
//! ring arithmetic. Plaintexts, in contrast, are concrete coefficient vectors: the
//! protocol packs database bytes and one-hot selection vectors into them on both sides
//! of the boundary.

use crate::pir_internals::error::PhocaPIRError;

/// A plaintext polynomial in coefficient representation.
///
/// Coefficient semantics (modulus, NTT form) belong to the engine; the protocol only
/// reads and writes raw `u64` coefficients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plaintext {
    coeffs: Vec<u64>,
}

impl Plaintext {
    /// All-zero plaintext with `coeff_count` coefficients.
    pub fn zero(coeff_count: usize) -> Plaintext {
        Plaintext {
            coeffs: vec![0; coeff_count],
        }
    }

    /// Constant plaintext: `value` at the constant term, zero elsewhere.
    pub fn constant(coeff_count: usize, value: u64) -> Plaintext {
        let mut plaintext = Plaintext::zero(coeff_count);
        plaintext.coeffs[0] = value;
        plaintext
    }

    pub fn from_coeffs(coeffs: Vec<u64>) -> Plaintext {
        Plaintext { coeffs }
    }

    #[inline(always)]
    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }

    #[inline(always)]
    pub fn coeffs_mut(&mut self) -> &mut [u64] {
        &mut self.coeffs
    }

    #[inline(always)]
    pub fn coeff_count(&self) -> usize {
        self.coeffs.len()
    }
}

/// Operations a leveled HE scheme must provide for the PIR protocol to run over it.
///
/// Contract highlights the protocol relies on:
///
/// * ciphertexts sharing one engine serialize to a fixed byte length
///   ([`Self::ciphertext_byte_len`]), so wire buffers can be re-chunked without
///   delimiters;
/// * [`Self::apply_galois`] implements the automorphism `x -> x^g` under the given
///   rotation keys, and [`Self::multiply_power_of_x`] the negacyclic monomial shift
///   `x -> x * x^power`, both of which drive oblivious query expansion;
/// * [`Self::decompose_to_plaintexts`] splits a ciphertext into exactly
///   [`Self::expansion_ratio`] plaintexts that [`Self::compose_to_ciphertext`]
///   reassembles, which is how intermediate fold results re-enter the plaintext domain
///   between recursion levels.
pub trait HeEngine: Send + Sync {
    type Ciphertext: Clone + Send + Sync;
    type PublicKey: Send + Sync;
    type SecretKey: Send + Sync;
    type RotationKeys: Send + Sync;

    fn poly_degree(&self) -> usize;
    fn plain_modulus(&self) -> u64;

    /// Number of plaintexts one ciphertext decomposes into.
    fn expansion_ratio(&self) -> usize;

    fn generate_keypair(&self) -> Result<(Self::PublicKey, Self::SecretKey), PhocaPIRError>;

    /// Rotation keys covering exactly the given Galois elements.
    fn generate_rotation_keys(&self, secret_key: &Self::SecretKey, galois_elts: &[u32]) -> Result<Self::RotationKeys, PhocaPIRError>;

    fn encrypt(&self, public_key: &Self::PublicKey, plaintext: &Plaintext) -> Result<Self::Ciphertext, PhocaPIRError>;
    fn decrypt(&self, secret_key: &Self::SecretKey, ciphertext: &Self::Ciphertext) -> Result<Plaintext, PhocaPIRError>;

    fn add(&self, lhs: &Self::Ciphertext, rhs: &Self::Ciphertext) -> Result<Self::Ciphertext, PhocaPIRError>;
    fn multiply_plain(&self, ciphertext: &Self::Ciphertext, plaintext: &Plaintext) -> Result<Self::Ciphertext, PhocaPIRError>;
    fn apply_galois(&self, ciphertext: &Self::Ciphertext, galois_elt: u32, keys: &Self::RotationKeys) -> Result<Self::Ciphertext, PhocaPIRError>;
    fn multiply_power_of_x(&self, ciphertext: &Self::Ciphertext, power: usize) -> Result<Self::Ciphertext, PhocaPIRError>;

    /// Moves a plaintext into evaluation (NTT) form ahead of repeated multiplications.
    fn transform_plain_to_ntt(&self, plaintext: &mut Plaintext);
    fn transform_to_ntt(&self, ciphertext: &mut Self::Ciphertext);
    fn transform_from_ntt(&self, ciphertext: &mut Self::Ciphertext);

    fn decompose_to_plaintexts(&self, ciphertext: &Self::Ciphertext) -> Vec<Plaintext>;
    fn compose_to_ciphertext(&self, plaintexts: &[Plaintext]) -> Result<Self::Ciphertext, PhocaPIRError>;

    /// Fixed serialized byte length shared by every ciphertext of this engine.
    fn ciphertext_byte_len(&self) -> usize;
    fn serialize_ciphertext(&self, ciphertext: &Self::Ciphertext) -> Vec<u8>;
    fn deserialize_ciphertext(&self, bytes: &[u8]) -> Result<Self::Ciphertext, PhocaPIRError>;

    fn serialize_rotation_keys(&self, keys: &Self::RotationKeys) -> Vec<u8>;
    fn deserialize_rotation_keys(&self, bytes: &[u8]) -> Result<Self::RotationKeys, PhocaPIRError>;
}
