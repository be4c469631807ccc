use crate::pir_internals::{branch_opt_util, error::PhocaPIRError};

/// The protocol supports exactly two or three recursive folding dimensions.
pub const SUPPORTED_RECURSION_DEPTHS: std::ops::RangeInclusive<usize> = 2..=3;

/// Upper bound on the plaintext modulus bit length; keeps all coefficient
/// packing arithmetic inside a u64 accumulator.
pub const MAX_PLAIN_MODULUS_BIT_LEN: usize = 32;

/// Protocol-level sizing constants, derived once and shared (immutably) by a client and
/// the server it talks to. Both endpoints must be constructed from equal `Parameters`,
/// otherwise queries and replies are structurally meaningless to each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
    num_items: usize,
    item_bytes: usize,
    poly_degree: usize,
    plain_modulus_bit_len: usize,
    dimension_count: usize,
    coeffs_per_item: usize,
    items_per_plaintext: usize,
    num_plaintexts: usize,
    dimension_sizes: Vec<usize>,
}

impl Parameters {
    /// Derives all sizing constants from the five protocol inputs.
    ///
    /// # Arguments
    ///
    /// * `num_items` - Number of items held by the server.
    /// * `item_bytes` - Byte length of every item.
    /// * `poly_degree` - The HE engine's polynomial degree (power of two).
    /// * `plain_modulus_bit_len` - Usable bits per plaintext coefficient.
    /// * `dimension_count` - Recursion depth, either 2 or 3.
    ///
    /// # Returns
    ///
    /// * `Result<Parameters, PhocaPIRError>` - The derived parameters, or an error if an
    ///   input is zero, the polynomial degree is not a power of two, the recursion depth
    ///   is unsupported, or a single item exceeds one plaintext's coefficient space.
    pub fn new(
        num_items: usize,
        item_bytes: usize,
        poly_degree: usize,
        plain_modulus_bit_len: usize,
        dimension_count: usize,
    ) -> Result<Parameters, PhocaPIRError> {
        if branch_opt_util::unlikely(num_items == 0 || item_bytes == 0 || poly_degree == 0) {
            return Err(PhocaPIRError::InvalidParameterValue);
        }
        if branch_opt_util::unlikely(!poly_degree.is_power_of_two()) {
            return Err(PhocaPIRError::PolyDegreeNotPowerOfTwo);
        }
        if branch_opt_util::unlikely(plain_modulus_bit_len == 0 || plain_modulus_bit_len > MAX_PLAIN_MODULUS_BIT_LEN) {
            return Err(PhocaPIRError::PlainModulusBitLenOutOfRange);
        }
        if branch_opt_util::unlikely(!SUPPORTED_RECURSION_DEPTHS.contains(&dimension_count)) {
            return Err(PhocaPIRError::UnsupportedRecursionDepth(dimension_count));
        }

        let coeffs_per_item = (8 * item_bytes).div_ceil(plain_modulus_bit_len);
        if branch_opt_util::unlikely(coeffs_per_item > poly_degree) {
            return Err(PhocaPIRError::ItemTooLargeForPlaintext);
        }

        let items_per_plaintext = poly_degree / coeffs_per_item;
        let num_plaintexts = num_items.div_ceil(items_per_plaintext);
        let dimension_sizes = derive_dimension_sizes(num_plaintexts, dimension_count);

        Ok(Parameters {
            num_items,
            item_bytes,
            poly_degree,
            plain_modulus_bit_len,
            dimension_count,
            coeffs_per_item,
            items_per_plaintext,
            num_plaintexts,
            dimension_sizes,
        })
    }

    #[inline(always)]
    pub const fn num_items(&self) -> usize {
        self.num_items
    }
    #[inline(always)]
    pub const fn item_bytes(&self) -> usize {
        self.item_bytes
    }
    #[inline(always)]
    pub const fn poly_degree(&self) -> usize {
        self.poly_degree
    }
    #[inline(always)]
    pub const fn plain_modulus_bit_len(&self) -> usize {
        self.plain_modulus_bit_len
    }
    #[inline(always)]
    pub const fn dimension_count(&self) -> usize {
        self.dimension_count
    }
    #[inline(always)]
    pub const fn coeffs_per_item(&self) -> usize {
        self.coeffs_per_item
    }
    #[inline(always)]
    pub const fn items_per_plaintext(&self) -> usize {
        self.items_per_plaintext
    }
    #[inline(always)]
    pub const fn num_plaintexts(&self) -> usize {
        self.num_plaintexts
    }
    #[inline(always)]
    pub fn dimension_sizes(&self) -> &[usize] {
        &self.dimension_sizes
    }

    /// Number of plaintexts in the reshaped database, including the zero padding up to
    /// the full `n_1 * ... * n_d` coordinate space.
    #[inline(always)]
    pub fn padded_plaintext_count(&self) -> usize {
        self.dimension_sizes.iter().product()
    }

    /// Byte length of the item payload carried by one plaintext slot.
    #[inline(always)]
    pub const fn plaintext_slot_bytes(&self) -> usize {
        self.items_per_plaintext * self.item_bytes
    }

    /// Number of packed query ciphertexts a client sends for dimension `dim`.
    #[inline(always)]
    pub fn query_ciphertext_count(&self, dim: usize) -> usize {
        self.dimension_sizes[dim].div_ceil(self.poly_degree)
    }

    /// Size of the `batch`-th expansion batch of dimension `dim`. All batches cover
    /// `poly_degree` selection slots except the last, which covers the remainder.
    pub(crate) fn expansion_batch_size(&self, dim: usize, batch: usize) -> usize {
        let batch_count = self.query_ciphertext_count(dim);
        if batch + 1 == batch_count {
            self.dimension_sizes[dim] - (batch_count - 1) * self.poly_degree
        } else {
            self.poly_degree
        }
    }
}

/// Factors `num_plaintexts` into `dimension_count` near-equal sizes whose product covers
/// every plaintext: starts from the ceiled d-th root and then greedily shrinks trailing
/// dimensions while coverage still holds.
fn derive_dimension_sizes(num_plaintexts: usize, dimension_count: usize) -> Vec<usize> {
    let root = nth_root_ceil(num_plaintexts, dimension_count as u32);
    let mut sizes = vec![root; dimension_count];

    for k in (0..dimension_count).rev() {
        while sizes[k] > 1 {
            let product_without: usize = sizes.iter().enumerate().filter(|&(i, _)| i != k).map(|(_, &s)| s).product();
            if product_without * (sizes[k] - 1) >= num_plaintexts {
                sizes[k] -= 1;
            } else {
                break;
            }
        }
    }

    sizes
}

/// Smallest `r` with `r^d >= n`. A float seed gets the search close; the integer loops
/// make the result exact regardless of rounding.
fn nth_root_ceil(n: usize, d: u32) -> usize {
    if n <= 1 {
        return 1;
    }

    let mut root = ((n as f64).powf(1f64 / d as f64).floor() as usize).max(1);
    while (root as u128).pow(d) >= n as u128 && root > 1 {
        root -= 1;
    }
    while (root as u128).pow(d) < n as u128 {
        root += 1;
    }

    root
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 2; "single item two dims")]
    #[test_case(1, 3; "single item three dims")]
    #[test_case(100, 2; "hundred items two dims")]
    #[test_case(100, 3; "hundred items three dims")]
    #[test_case(1 << 12, 2; "4k items two dims")]
    #[test_case(1 << 12, 3; "4k items three dims")]
    fn dimension_sizes_cover_all_plaintexts(num_items: usize, dimension_count: usize) {
        let params = Parameters::new(num_items, 16, 1024, 12, dimension_count).unwrap();

        assert_eq!(params.dimension_sizes().len(), dimension_count);
        assert!(params.dimension_sizes().iter().all(|&n| n >= 1));
        assert!(params.padded_plaintext_count() >= params.num_plaintexts());
    }

    #[test]
    fn dimension_sizes_stay_balanced() {
        let params = Parameters::new(1 << 16, 32, 2048, 12, 2).unwrap();

        let sizes = params.dimension_sizes();
        let spread = sizes.iter().max().unwrap() - sizes.iter().min().unwrap();
        assert!(spread <= 1);

        // removing one from any dimension must break coverage, otherwise derivation left slack
        for k in 0..sizes.len() {
            let mut shrunk = sizes.to_vec();
            if shrunk[k] > 1 {
                shrunk[k] -= 1;
                assert!(shrunk.iter().product::<usize>() < params.num_plaintexts());
            }
        }
    }

    #[test]
    fn nth_root_ceil_is_exact() {
        for n in 1..=1000usize {
            for d in 2..=3u32 {
                let r = nth_root_ceil(n, d);
                assert!((r as u128).pow(d) >= n as u128);
                assert!(r == 1 || ((r - 1) as u128).pow(d) < n as u128);
            }
        }
    }

    #[test]
    fn item_capacity_boundary() {
        // item exactly fills one plaintext: 1024 coefficients of 12 usable bits = 1536 bytes
        let params = Parameters::new(8, 1536, 1024, 12, 2).unwrap();
        assert_eq!(params.items_per_plaintext(), 1);
        assert_eq!(params.num_plaintexts(), 8);

        assert_eq!(Parameters::new(8, 1537, 1024, 12, 2), Err(PhocaPIRError::ItemTooLargeForPlaintext));
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(Parameters::new(0, 16, 1024, 12, 2), Err(PhocaPIRError::InvalidParameterValue));
        assert_eq!(Parameters::new(16, 0, 1024, 12, 2), Err(PhocaPIRError::InvalidParameterValue));
        assert_eq!(Parameters::new(16, 16, 1000, 12, 2), Err(PhocaPIRError::PolyDegreeNotPowerOfTwo));
        assert_eq!(Parameters::new(16, 16, 1024, 0, 2), Err(PhocaPIRError::PlainModulusBitLenOutOfRange));
        assert_eq!(Parameters::new(16, 16, 1024, 33, 2), Err(PhocaPIRError::PlainModulusBitLenOutOfRange));
        assert_eq!(Parameters::new(16, 16, 1024, 12, 1), Err(PhocaPIRError::UnsupportedRecursionDepth(1)));
        assert_eq!(Parameters::new(16, 16, 1024, 12, 4), Err(PhocaPIRError::UnsupportedRecursionDepth(4)));
    }

    #[test]
    fn expansion_batches_cover_dimension() {
        // force a dimension larger than the polynomial degree so multiple batches appear
        let params = Parameters::new(300, 16, 16, 8, 2).unwrap();

        for dim in 0..params.dimension_count() {
            let batch_count = params.query_ciphertext_count(dim);
            let covered: usize = (0..batch_count).map(|b| params.expansion_batch_size(dim, b)).sum();

            assert_eq!(covered, params.dimension_sizes()[dim]);
            for batch in 0..batch_count {
                let size = params.expansion_batch_size(dim, batch);
                assert!(size >= 1 && size <= params.poly_degree());
            }
        }
    }
}
