use crate::{
    client::{GaloisKeys, Query},
    engine::{HeEngine, Plaintext},
    pir_internals::{branch_opt_util, error::PhocaPIRError, expand, packing, params::Parameters},
};
use rayon::prelude::*;
use std::{
    cmp::min,
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// A query after oblivious expansion: dimension `k`'s group holds exactly `n_k`
/// selection ciphertexts, one per possible digit value. Same information as the
/// [`Query`] it came from, traded towards server compute and away from wire size.
pub struct ExpandedQuery<E: HeEngine> {
    pub(crate) client_id: u64,
    pub(crate) dimension_groups: Vec<Vec<E::Ciphertext>>,
}

impl<E: HeEngine> ExpandedQuery<E> {
    #[inline(always)]
    pub const fn client_id(&self) -> u64 {
        self.client_id
    }

    #[inline(always)]
    pub fn dimension_count(&self) -> usize {
        self.dimension_groups.len()
    }
}

impl<E: HeEngine> Clone for ExpandedQuery<E> {
    fn clone(&self) -> Self {
        ExpandedQuery {
            client_id: self.client_id,
            dimension_groups: self.dimension_groups.clone(),
        }
    }
}

impl<E: HeEngine> PartialEq for ExpandedQuery<E>
where
    E::Ciphertext: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id && self.dimension_groups == other.dimension_groups
    }
}

impl<E: HeEngine> std::fmt::Debug for ExpandedQuery<E>
where
    E::Ciphertext: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpandedQuery")
            .field("client_id", &self.client_id)
            .field("dimension_groups", &self.dimension_groups)
            .finish()
    }
}

/// The folded dot-product answering one query: `expansion_ratio^(d-1)` ciphertexts that
/// the issuing client decodes back into one plaintext slot.
pub struct Reply<E: HeEngine> {
    pub(crate) ciphertexts: Vec<E::Ciphertext>,
}

impl<E: HeEngine> Reply<E> {
    #[inline(always)]
    pub fn ciphertext_count(&self) -> usize {
        self.ciphertexts.len()
    }
}

impl<E: HeEngine> Clone for Reply<E> {
    fn clone(&self) -> Self {
        Reply {
            ciphertexts: self.ciphertexts.clone(),
        }
    }
}

impl<E: HeEngine> PartialEq for Reply<E>
where
    E::Ciphertext: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.ciphertexts == other.ciphertexts
    }
}

impl<E: HeEngine> std::fmt::Debug for Reply<E>
where
    E::Ciphertext: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply").field("ciphertexts", &self.ciphertexts).finish()
    }
}

/// One-shot lifecycle of the server-held database.
enum DatabaseState {
    Empty,
    Staged(Vec<Plaintext>),
    Preprocessed(Vec<Plaintext>),
}

/// The answering side of the PIR protocol.
///
/// Setup (`setup_database`, `preprocess_database`) takes `&mut self`; every serving
/// method takes `&self`, so a preprocessed server can be shared across threads and
/// answer independent clients concurrently. Rotation keys live in an interior-mutable
/// table keyed by client id: lookups run under a read lock, registration takes the
/// write lock only for the map insert, and re-registration replaces the previous
/// material (last write wins).
pub struct Server<E: HeEngine> {
    engine: E,
    params: Parameters,
    database: DatabaseState,
    galois_keys: RwLock<HashMap<u64, Arc<E::RotationKeys>>>,
}

impl<E: HeEngine> Server<E> {
    /// Creates an empty server; ingest and preprocess a database before serving.
    pub fn new(engine: E, params: Parameters) -> Result<Server<E>, PhocaPIRError> {
        if branch_opt_util::unlikely(engine.poly_degree() != params.poly_degree()) {
            return Err(PhocaPIRError::InvalidParameterValue);
        }

        Ok(Server {
            engine,
            params,
            database: DatabaseState::Empty,
            galois_keys: RwLock::new(HashMap::new()),
        })
    }

    #[inline(always)]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Registers (or replaces) rotation keys for `client_id`. Required before any query
    /// from that client can be expanded.
    ///
    /// # Arguments
    ///
    /// * `client_id` - The id the keys are registered under.
    /// * `keys` - The client's key material; its embedded id must match `client_id`.
    pub fn set_galois_key(&self, client_id: u64, keys: &GaloisKeys) -> Result<(), PhocaPIRError> {
        if branch_opt_util::unlikely(keys.client_id != client_id) {
            return Err(PhocaPIRError::GaloisKeyClientIdMismatch);
        }

        let rotation_keys = self.engine.deserialize_rotation_keys(&keys.key_bytes)?;

        let mut table = match self.galois_keys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.insert(client_id, Arc::new(rotation_keys));

        Ok(())
    }

    fn rotation_keys_for(&self, client_id: u64) -> Result<Arc<E::RotationKeys>, PhocaPIRError> {
        let table = match self.galois_keys.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match table.get(&client_id) {
            Some(keys) => Ok(Arc::clone(keys)),
            None => {
                branch_opt_util::cold();
                Err(PhocaPIRError::GaloisKeysNotFoundForClient(client_id))
            }
        }
    }

    /// Ingests the raw database and reshapes it into the `d`-dimensional plaintext
    /// matrix: bytes are packed bit-contiguously into coefficients, one plaintext per
    /// `items_per_plaintext` items, zero-padded out to the full `n_1 * ... * n_d`
    /// coordinate space.
    ///
    /// # Arguments
    ///
    /// * `raw_bytes` - Exactly `num_items * item_bytes` bytes, item-major.
    pub fn setup_database(&mut self, raw_bytes: &[u8]) -> Result<(), PhocaPIRError> {
        if branch_opt_util::unlikely(!matches!(self.database, DatabaseState::Empty)) {
            return Err(PhocaPIRError::DatabaseAlreadySet);
        }
        if branch_opt_util::unlikely(raw_bytes.len() != self.params.num_items() * self.params.item_bytes()) {
            return Err(PhocaPIRError::DatabaseSizeMismatch);
        }

        let poly_degree = self.params.poly_degree();
        let slot_bytes = self.params.plaintext_slot_bytes();
        let plain_modulus_bit_len = self.params.plain_modulus_bit_len();

        let mut plaintexts: Vec<Plaintext> = (0..self.params.num_plaintexts())
            .into_par_iter()
            .map(|slot| {
                let begin = slot * slot_bytes;
                let end = min(begin + slot_bytes, raw_bytes.len());

                let mut coeffs = packing::bytes_to_coeffs(plain_modulus_bit_len, &raw_bytes[begin..end]);
                coeffs.resize(poly_degree, 0);
                Plaintext::from_coeffs(coeffs)
            })
            .collect();
        plaintexts.resize(self.params.padded_plaintext_count(), Plaintext::zero(poly_degree));

        self.database = DatabaseState::Staged(plaintexts);
        Ok(())
    }

    /// One-time transform of every database plaintext into the engine's evaluation
    /// domain. After this the database is immutable and every reply path is available.
    pub fn preprocess_database(&mut self) -> Result<(), PhocaPIRError> {
        match std::mem::replace(&mut self.database, DatabaseState::Empty) {
            DatabaseState::Staged(mut plaintexts) => {
                let engine = &self.engine;
                plaintexts.par_iter_mut().for_each(|plaintext| engine.transform_plain_to_ntt(plaintext));

                self.database = DatabaseState::Preprocessed(plaintexts);
                Ok(())
            }
            DatabaseState::Empty => Err(PhocaPIRError::DatabaseNotStaged),
            DatabaseState::Preprocessed(plaintexts) => {
                self.database = DatabaseState::Preprocessed(plaintexts);
                Err(PhocaPIRError::DatabaseAlreadyPreprocessed)
            }
        }
    }

    fn preprocessed_database(&self) -> Result<&[Plaintext], PhocaPIRError> {
        match &self.database {
            DatabaseState::Preprocessed(plaintexts) => Ok(plaintexts),
            _ => {
                branch_opt_util::cold();
                Err(PhocaPIRError::DatabaseNotPreprocessed)
            }
        }
    }

    /// Phase 1 of the two-phase path: obliviously unpacks each dimension's packed
    /// ciphertexts into `n_k` selection ciphertexts using the client's rotation keys.
    ///
    /// # Arguments
    ///
    /// * `query` - The compact query to expand.
    /// * `client_id` - Whose rotation keys to use; must match the query's tag.
    ///
    /// # Returns
    ///
    /// * `Result<ExpandedQuery<E>, PhocaPIRError>` - Fails with
    ///   `GaloisKeysNotFoundForClient` if the client never registered keys, or with a
    ///   protocol error if the query shape disagrees with the parameters.
    pub fn expand_query(&self, query: &Query<E>, client_id: u64) -> Result<ExpandedQuery<E>, PhocaPIRError> {
        if branch_opt_util::unlikely(query.client_id != client_id) {
            return Err(PhocaPIRError::QueryClientIdMismatch);
        }
        if branch_opt_util::unlikely(query.dimension_groups.len() != self.params.dimension_count()) {
            return Err(PhocaPIRError::QueryDimensionCountMismatch);
        }

        let rotation_keys = self.rotation_keys_for(client_id)?;

        let mut dimension_groups = Vec::with_capacity(self.params.dimension_count());
        for (dim, group) in query.dimension_groups.iter().enumerate() {
            let batch_count = self.params.query_ciphertext_count(dim);
            if branch_opt_util::unlikely(group.len() != batch_count) {
                return Err(PhocaPIRError::SelectionVectorLengthMismatch);
            }

            let mut selections = Vec::with_capacity(self.params.dimension_sizes()[dim]);
            for (batch, packed) in group.iter().enumerate() {
                let batch_size = self.params.expansion_batch_size(dim, batch);
                selections.extend(expand::expand_ciphertext(&self.engine, packed, batch_size, &rotation_keys)?);
            }

            dimension_groups.push(selections);
        }

        Ok(ExpandedQuery {
            client_id,
            dimension_groups,
        })
    }

    /// Answers a compact query in one call: expansion followed by the recursive fold.
    /// Expansion needs the client's registered rotation keys, so this fails with
    /// `GaloisKeysNotFoundForClient` for unregistered clients, exactly like
    /// [`Self::expand_query`].
    pub fn generate_reply(&self, query: &Query<E>, client_id: u64) -> Result<Reply<E>, PhocaPIRError> {
        self.preprocessed_database()?;

        let expanded = self.expand_query(query, client_id)?;
        self.generate_reply_with_expanded_queries(&expanded, client_id)
    }

    /// Phase 2 of the two-phase path: folds the database against already-expanded
    /// selection vectors. Produces a reply identical (after decryption) to
    /// [`Self::generate_reply`] on the originating query.
    ///
    /// One fold per dimension: a ciphertext–plaintext multiply-accumulate collapses the
    /// leading axis, then each intermediate ciphertext is decomposed back into
    /// plaintexts for the next fold. The per-output accumulation runs in parallel.
    pub fn generate_reply_with_expanded_queries(&self, expanded: &ExpandedQuery<E>, client_id: u64) -> Result<Reply<E>, PhocaPIRError> {
        if branch_opt_util::unlikely(expanded.client_id != client_id) {
            return Err(PhocaPIRError::QueryClientIdMismatch);
        }

        let database = self.preprocessed_database()?;

        let dimension_sizes = self.params.dimension_sizes();
        if branch_opt_util::unlikely(expanded.dimension_groups.len() != dimension_sizes.len()) {
            return Err(PhocaPIRError::QueryDimensionCountMismatch);
        }
        for (group, &dim_size) in expanded.dimension_groups.iter().zip(dimension_sizes) {
            if branch_opt_util::unlikely(group.len() != dim_size) {
                return Err(PhocaPIRError::SelectionVectorLengthMismatch);
            }
        }

        let engine = &self.engine;
        let mut product = self.params.padded_plaintext_count();
        let mut layer_plaintexts: Vec<Plaintext> = Vec::new();

        for (dim, group) in expanded.dimension_groups.iter().enumerate() {
            let current: &[Plaintext] = if dim == 0 { database } else { &layer_plaintexts };

            let selections: Vec<E::Ciphertext> = group
                .iter()
                .map(|ciphertext| {
                    let mut selection = ciphertext.clone();
                    engine.transform_to_ntt(&mut selection);
                    selection
                })
                .collect();

            let dim_size = dimension_sizes[dim];
            product /= dim_size;

            let folded = (0..product)
                .into_par_iter()
                .map(|k| {
                    let mut accumulator = engine.multiply_plain(&selections[0], &current[k])?;
                    for j in 1..dim_size {
                        let term = engine.multiply_plain(&selections[j], &current[k + j * product])?;
                        accumulator = engine.add(&accumulator, &term)?;
                    }

                    engine.transform_from_ntt(&mut accumulator);
                    Ok(accumulator)
                })
                .collect::<Result<Vec<E::Ciphertext>, PhocaPIRError>>()?;

            if dim + 1 == dimension_sizes.len() {
                return Ok(Reply { ciphertexts: folded });
            }

            layer_plaintexts = folded
                .iter()
                .flat_map(|ciphertext| engine.decompose_to_plaintexts(ciphertext))
                .map(|mut plaintext| {
                    engine.transform_plain_to_ntt(&mut plaintext);
                    plaintext
                })
                .collect();
            product = layer_plaintexts.len();
        }

        branch_opt_util::cold();
        Err(PhocaPIRError::QueryDimensionCountMismatch)
    }
}
