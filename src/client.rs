use crate::{
    engine::{HeEngine, Plaintext},
    pir_internals::{branch_opt_util, error::PhocaPIRError, expand, indexing, packing, params::Parameters},
    server::Reply,
};

/// A client's rotation-key material, serialized through its engine and tagged with the
/// client id it belongs to. The server keeps one of these per registered client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GaloisKeys {
    pub(crate) client_id: u64,
    pub(crate) key_bytes: Vec<u8>,
}

impl GaloisKeys {
    #[inline(always)]
    pub const fn client_id(&self) -> u64 {
        self.client_id
    }
}

/// A compact PIR query: one ciphertext group per recursion dimension, each group
/// packing that dimension's one-hot selection vector into coefficient slots of
/// `ceil(n_k / poly_degree)` ciphertexts.
pub struct Query<E: HeEngine> {
    pub(crate) client_id: u64,
    pub(crate) dimension_groups: Vec<Vec<E::Ciphertext>>,
}

impl<E: HeEngine> Query<E> {
    #[inline(always)]
    pub const fn client_id(&self) -> u64 {
        self.client_id
    }

    #[inline(always)]
    pub fn dimension_count(&self) -> usize {
        self.dimension_groups.len()
    }
}

impl<E: HeEngine> Clone for Query<E> {
    fn clone(&self) -> Self {
        Query {
            client_id: self.client_id,
            dimension_groups: self.dimension_groups.clone(),
        }
    }
}

impl<E: HeEngine> PartialEq for Query<E>
where
    E::Ciphertext: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id && self.dimension_groups == other.dimension_groups
    }
}

impl<E: HeEngine> std::fmt::Debug for Query<E>
where
    E::Ciphertext: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("client_id", &self.client_id)
            .field("dimension_groups", &self.dimension_groups)
            .finish()
    }
}

/// Scale bookkeeping for the most recently generated query; reply decoding needs it to
/// undo the per-dimension expansion scales.
struct PendingQuery {
    inverse_scales: Vec<u64>,
}

/// The querying side of the PIR protocol.
///
/// A client owns its HE keypair and a numeric id. The id links the rotation keys it
/// registers on the server to the queries it sends; the keypair never leaves the
/// client. Generating a query records decoding state, so a reply must be decoded by
/// the same client instance that produced its query (the state is replaced by the next
/// `generate_query` call).
pub struct Client<E: HeEngine> {
    engine: E,
    params: Parameters,
    client_id: u64,
    public_key: E::PublicKey,
    secret_key: E::SecretKey,
    pending_query: Option<PendingQuery>,
}

impl<E: HeEngine> Client<E> {
    /// Creates a client with a fresh keypair drawn from the engine.
    ///
    /// # Arguments
    ///
    /// * `engine` - The HE engine; its polynomial degree must match `params`.
    /// * `params` - The protocol parameters shared with the server.
    /// * `client_id` - The id this client registers keys and sends queries under.
    pub fn new(engine: E, params: Parameters, client_id: u64) -> Result<Client<E>, PhocaPIRError> {
        if branch_opt_util::unlikely(engine.poly_degree() != params.poly_degree()) {
            return Err(PhocaPIRError::InvalidParameterValue);
        }

        let (public_key, secret_key) = engine.generate_keypair()?;
        Ok(Client {
            engine,
            params,
            client_id,
            public_key,
            secret_key,
            pending_query: None,
        })
    }

    #[inline(always)]
    pub const fn client_id(&self) -> u64 {
        self.client_id
    }

    #[inline(always)]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Plaintext slot holding item `elem_index`; pass the result to [`Self::generate_query`].
    #[inline(always)]
    pub fn fv_index(&self, elem_index: usize) -> usize {
        indexing::fv_index(&self.params, elem_index)
    }

    /// Item position inside the decoded slot; slice the [`Self::decode_reply`] output at
    /// `fv_offset * item_bytes`.
    #[inline(always)]
    pub fn fv_offset(&self, elem_index: usize) -> usize {
        indexing::fv_offset(&self.params, elem_index)
    }

    /// Rotation keys sufficient for the server to expand this client's queries, tagged
    /// with the client id. Register them server-side with `Server::set_galois_key`
    /// before submitting queries.
    pub fn generate_galois_keys(&self) -> Result<GaloisKeys, PhocaPIRError> {
        let galois_elts = expand::expansion_galois_elements(self.params.poly_degree());
        let rotation_keys = self.engine.generate_rotation_keys(&self.secret_key, &galois_elts)?;

        Ok(GaloisKeys {
            client_id: self.client_id,
            key_bytes: self.engine.serialize_rotation_keys(&rotation_keys),
        })
    }

    /// Builds the compact query selecting `plaintext_slot`.
    ///
    /// The slot is decomposed into one digit per recursion dimension; each digit is
    /// packed as a one-hot coefficient into that dimension's ciphertext group. Decoding
    /// state for the eventual reply is recorded on this client, replacing any previous
    /// pending query.
    ///
    /// # Arguments
    ///
    /// * `plaintext_slot` - The slot to retrieve, usually `fv_index(elem_index)`.
    ///
    /// # Returns
    ///
    /// * `Result<Query<E>, PhocaPIRError>` - The query, tagged with this client's id.
    ///   Fails if the slot lies beyond the encoded database, or if the engine's
    ///   plaintext modulus admits no inverse for an expansion scale.
    pub fn generate_query(&mut self, plaintext_slot: usize) -> Result<Query<E>, PhocaPIRError> {
        if branch_opt_util::unlikely(plaintext_slot >= self.params.num_plaintexts()) {
            return Err(PhocaPIRError::PlaintextSlotOutOfRange);
        }

        let digits = indexing::compute_indices(&self.params, plaintext_slot);
        let inverse_scales = indexing::inverse_scales(&self.params, &digits, self.engine.plain_modulus())?;

        let poly_degree = self.params.poly_degree();
        let mut dimension_groups = Vec::with_capacity(self.params.dimension_count());

        for (dim, &digit) in digits.iter().enumerate() {
            let batch_count = self.params.query_ciphertext_count(dim);
            let mut group = Vec::with_capacity(batch_count);

            for batch in 0..batch_count {
                let batch_base = batch * poly_degree;
                let mut packed = Plaintext::zero(poly_degree);
                if digit >= batch_base && digit < batch_base + poly_degree {
                    packed.coeffs_mut()[digit - batch_base] = 1;
                }

                group.push(self.engine.encrypt(&self.public_key, &packed)?);
            }

            dimension_groups.push(group);
        }

        self.pending_query = Some(PendingQuery { inverse_scales });
        Ok(Query {
            client_id: self.client_id,
            dimension_groups,
        })
    }

    /// Decodes a reply to the pending query down to one plaintext slot's bytes.
    ///
    /// Runs the recursion in reverse: each round decrypts the current ciphertexts,
    /// multiplies the coefficients by that dimension's inverse expansion scale, and
    /// regroups `expansion_ratio` plaintexts into one ciphertext of the previous level.
    /// The final plaintext is unpacked into `items_per_plaintext * item_bytes` raw
    /// bytes; index into them at `fv_offset * item_bytes` to recover the item.
    ///
    /// # Arguments
    ///
    /// * `reply` - The server's reply; must hold `expansion_ratio^(d-1)` ciphertexts.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>, PhocaPIRError>` - The decoded slot bytes. Fails if no query
    ///   is pending, the reply is malformed, or the reply was produced for a different
    ///   client's key material.
    pub fn decode_reply(&self, reply: &Reply<E>) -> Result<Vec<u8>, PhocaPIRError> {
        let pending = self.pending_query.as_ref().ok_or(PhocaPIRError::NoPendingQuery)?;

        let dimension_count = self.params.dimension_count();
        let expansion_ratio = self.engine.expansion_ratio();
        let expected_count = expansion_ratio.pow((dimension_count - 1) as u32);
        if branch_opt_util::unlikely(reply.ciphertexts.len() != expected_count) {
            return Err(PhocaPIRError::ReplyCiphertextCountMismatch);
        }

        let plain_modulus = self.engine.plain_modulus();
        let mut layer = reply.ciphertexts.clone();

        for round in 0..dimension_count {
            // the last fold ran over the last dimension, so scales unwind back to front
            let inverse_scale = pending.inverse_scales[dimension_count - 1 - round];

            let mut plains = Vec::with_capacity(layer.len());
            for ciphertext in &layer {
                let mut plaintext = self.engine.decrypt(&self.secret_key, ciphertext)?;
                for coeff in plaintext.coeffs_mut() {
                    *coeff = ((*coeff as u128 * inverse_scale as u128) % plain_modulus as u128) as u64;
                }
                plains.push(plaintext);
            }

            if round + 1 == dimension_count {
                return Ok(packing::coeffs_to_bytes(
                    self.params.plain_modulus_bit_len(),
                    plains[0].coeffs(),
                    self.params.plaintext_slot_bytes(),
                ));
            }

            layer = plains
                .chunks_exact(expansion_ratio)
                .map(|chunk| self.engine.compose_to_ciphertext(chunk))
                .collect::<Result<Vec<_>, _>>()?;
        }

        branch_opt_util::cold();
        Err(PhocaPIRError::ReplyCiphertextCountMismatch)
    }
}
