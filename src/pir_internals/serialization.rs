//! Wire representations.
//!
//! Every serialized object is a single self-describing byte buffer: a little-endian
//! header declaring ciphertext size and counts, followed by the concatenated fixed-size
//! ciphertexts. Receivers validate the declared sizes against the actual buffer length
//! in one step before re-chunking, so a length mismatch can never smuggle a truncated
//! or padded ciphertext through.
//!
//! Layouts:
//!
//! * `Reply`:                `[ciphertext_size: u32][count: u32][payload]`
//! * `Query`/`ExpandedQuery`: `[client_id: u64][dimension_count: u32]
//!   [ciphertext_size: u32][count_k: u32 x dimension_count][payload]`
//! * `GaloisKeys`:           `[client_id: u64][key_len: u32][key payload]`

use crate::{
    client::{GaloisKeys, Query},
    engine::HeEngine,
    pir_internals::{branch_opt_util, error::PhocaPIRError, params::SUPPORTED_RECURSION_DEPTHS},
    server::{ExpandedQuery, Reply},
};

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, PhocaPIRError> {
    let end = *offset + std::mem::size_of::<u32>();
    if branch_opt_util::unlikely(bytes.len() < end) {
        return Err(PhocaPIRError::TruncatedSerializedBuffer);
    }

    let value = u32::from_le_bytes(bytes[*offset..end].try_into().unwrap());
    *offset = end;
    Ok(value)
}

fn read_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, PhocaPIRError> {
    let end = *offset + std::mem::size_of::<u64>();
    if branch_opt_util::unlikely(bytes.len() < end) {
        return Err(PhocaPIRError::TruncatedSerializedBuffer);
    }

    let value = u64::from_le_bytes(bytes[*offset..end].try_into().unwrap());
    *offset = end;
    Ok(value)
}

/// Splits `payload` into `count` ciphertexts of exactly `ciphertext_size` bytes each;
/// the payload must be fully covered.
fn deserialize_ciphertext_run<E: HeEngine>(engine: &E, payload: &[u8], ciphertext_size: usize, count: usize) -> Result<Vec<E::Ciphertext>, PhocaPIRError> {
    let expected_len = ciphertext_size.checked_mul(count).ok_or(PhocaPIRError::CiphertextBufferLengthMismatch)?;
    if branch_opt_util::unlikely(payload.len() != expected_len) {
        return Err(PhocaPIRError::CiphertextBufferLengthMismatch);
    }

    payload.chunks_exact(ciphertext_size).map(|chunk| engine.deserialize_ciphertext(chunk)).collect()
}

/// Shared layout of `Query` and `ExpandedQuery`: the two differ only in how many
/// ciphertexts each dimension group carries.
fn serialize_dimension_groups<E: HeEngine>(engine: &E, client_id: u64, dimension_groups: &[Vec<E::Ciphertext>]) -> Vec<u8> {
    let ciphertext_size = engine.ciphertext_byte_len();
    let total_count: usize = dimension_groups.iter().map(Vec::len).sum();

    let header_len = std::mem::size_of::<u64>() + std::mem::size_of::<u32>() * (2 + dimension_groups.len());
    let mut bytes = Vec::with_capacity(header_len + ciphertext_size * total_count);

    bytes.extend_from_slice(&client_id.to_le_bytes());
    bytes.extend_from_slice(&(dimension_groups.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(ciphertext_size as u32).to_le_bytes());
    for group in dimension_groups {
        bytes.extend_from_slice(&(group.len() as u32).to_le_bytes());
    }
    for ciphertext in dimension_groups.iter().flatten() {
        bytes.extend_from_slice(&engine.serialize_ciphertext(ciphertext));
    }

    bytes
}

#[allow(clippy::type_complexity)]
fn deserialize_dimension_groups<E: HeEngine>(engine: &E, bytes: &[u8]) -> Result<(u64, Vec<Vec<E::Ciphertext>>), PhocaPIRError> {
    let mut offset = 0;

    let client_id = read_u64(bytes, &mut offset)?;
    let dimension_count = read_u32(bytes, &mut offset)? as usize;
    if branch_opt_util::unlikely(dimension_count == 0 || dimension_count > *SUPPORTED_RECURSION_DEPTHS.end()) {
        return Err(PhocaPIRError::QueryDimensionCountMismatch);
    }

    let ciphertext_size = read_u32(bytes, &mut offset)? as usize;
    if branch_opt_util::unlikely(ciphertext_size != engine.ciphertext_byte_len()) {
        return Err(PhocaPIRError::SerializedCiphertextSizeMismatch);
    }

    let mut counts = Vec::with_capacity(dimension_count);
    for _ in 0..dimension_count {
        let count = read_u32(bytes, &mut offset)? as usize;
        if branch_opt_util::unlikely(count == 0) {
            return Err(PhocaPIRError::CiphertextBufferLengthMismatch);
        }
        counts.push(count);
    }

    let total_count: usize = counts.iter().sum();
    let expected_len = ciphertext_size.checked_mul(total_count).ok_or(PhocaPIRError::CiphertextBufferLengthMismatch)?;
    if branch_opt_util::unlikely(bytes.len() - offset != expected_len) {
        return Err(PhocaPIRError::CiphertextBufferLengthMismatch);
    }

    let mut dimension_groups = Vec::with_capacity(dimension_count);
    for count in counts {
        let end = offset + ciphertext_size * count;
        dimension_groups.push(deserialize_ciphertext_run(engine, &bytes[offset..end], ciphertext_size, count)?);
        offset = end;
    }

    Ok((client_id, dimension_groups))
}

impl<E: HeEngine> Query<E> {
    pub fn to_bytes(&self, engine: &E) -> Vec<u8> {
        serialize_dimension_groups(engine, self.client_id, &self.dimension_groups)
    }

    pub fn from_bytes(engine: &E, bytes: &[u8]) -> Result<Query<E>, PhocaPIRError> {
        let (client_id, dimension_groups) = deserialize_dimension_groups(engine, bytes)?;
        Ok(Query {
            client_id,
            dimension_groups,
        })
    }
}

impl<E: HeEngine> ExpandedQuery<E> {
    pub fn to_bytes(&self, engine: &E) -> Vec<u8> {
        serialize_dimension_groups(engine, self.client_id, &self.dimension_groups)
    }

    pub fn from_bytes(engine: &E, bytes: &[u8]) -> Result<ExpandedQuery<E>, PhocaPIRError> {
        let (client_id, dimension_groups) = deserialize_dimension_groups(engine, bytes)?;
        Ok(ExpandedQuery {
            client_id,
            dimension_groups,
        })
    }
}

impl<E: HeEngine> Reply<E> {
    pub fn to_bytes(&self, engine: &E) -> Vec<u8> {
        let ciphertext_size = engine.ciphertext_byte_len();

        let mut bytes = Vec::with_capacity(std::mem::size_of::<u32>() * 2 + ciphertext_size * self.ciphertexts.len());
        bytes.extend_from_slice(&(ciphertext_size as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.ciphertexts.len() as u32).to_le_bytes());
        for ciphertext in &self.ciphertexts {
            bytes.extend_from_slice(&engine.serialize_ciphertext(ciphertext));
        }

        bytes
    }

    pub fn from_bytes(engine: &E, bytes: &[u8]) -> Result<Reply<E>, PhocaPIRError> {
        let mut offset = 0;

        let ciphertext_size = read_u32(bytes, &mut offset)? as usize;
        if branch_opt_util::unlikely(ciphertext_size != engine.ciphertext_byte_len()) {
            return Err(PhocaPIRError::SerializedCiphertextSizeMismatch);
        }

        let count = read_u32(bytes, &mut offset)? as usize;
        if branch_opt_util::unlikely(count == 0) {
            return Err(PhocaPIRError::CiphertextBufferLengthMismatch);
        }

        let ciphertexts = deserialize_ciphertext_run(engine, &bytes[offset..], ciphertext_size, count)?;
        Ok(Reply { ciphertexts })
    }
}

impl GaloisKeys {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(std::mem::size_of::<u64>() + std::mem::size_of::<u32>() + self.key_bytes.len());
        bytes.extend_from_slice(&self.client_id.to_le_bytes());
        bytes.extend_from_slice(&(self.key_bytes.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.key_bytes);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<GaloisKeys, PhocaPIRError> {
        let mut offset = 0;

        let client_id = read_u64(bytes, &mut offset)?;
        let key_len = read_u32(bytes, &mut offset)? as usize;
        if branch_opt_util::unlikely(bytes.len() - offset != key_len) {
            return Err(PhocaPIRError::CiphertextBufferLengthMismatch);
        }

        Ok(GaloisKeys {
            client_id,
            key_bytes: bytes[offset..].to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{client::Client, engine::Plaintext, pir_internals::params::Parameters, plain_engine::PlainEngine, server::Server};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn setup(dimension_count: usize) -> (Parameters, PlainEngine) {
        let params = Parameters::new(64, 8, 32, 12, dimension_count).unwrap();
        let engine = PlainEngine::new(&params);
        (params, engine)
    }

    #[test_case(2; "two dims")]
    #[test_case(3; "three dims")]
    fn query_wire_round_trip(dimension_count: usize) {
        let (params, engine) = setup(dimension_count);
        let mut client = Client::new(engine.clone(), params, 42).unwrap();

        let query = client.generate_query(3).unwrap();
        let bytes = query.to_bytes(&engine);
        let recovered = Query::<PlainEngine>::from_bytes(&engine, &bytes).unwrap();

        assert_eq!(recovered.client_id(), 42);
        assert_eq!(recovered.dimension_count(), dimension_count);
        assert_eq!(recovered, query);
    }

    #[test_case(2; "two dims")]
    #[test_case(3; "three dims")]
    fn expanded_query_wire_round_trip(dimension_count: usize) {
        let (params, engine) = setup(dimension_count);
        let mut client = Client::new(engine.clone(), params.clone(), 7).unwrap();
        let server = Server::new(engine.clone(), params).unwrap();

        server.set_galois_key(7, &client.generate_galois_keys().unwrap()).unwrap();
        let query = client.generate_query(0).unwrap();
        let expanded = server.expand_query(&query, 7).unwrap();

        let bytes = expanded.to_bytes(&engine);
        let recovered = ExpandedQuery::<PlainEngine>::from_bytes(&engine, &bytes).unwrap();

        assert_eq!(recovered, expanded);
    }

    #[test_case(1; "single ciphertext")]
    #[test_case(2; "two ciphertexts")]
    #[test_case(3; "three ciphertexts")]
    fn reply_wire_round_trip(count: usize) {
        let (params, engine) = setup(2);
        let (public_key, _) = engine.generate_keypair().unwrap();
        let mut rng = ChaCha8Rng::from_os_rng();

        let ciphertexts = (0..count)
            .map(|_| {
                let coeffs = (0..params.poly_degree()).map(|_| rng.random::<u64>() % (1 << 12)).collect();
                engine.encrypt(&public_key, &Plaintext::from_coeffs(coeffs)).unwrap()
            })
            .collect::<Vec<_>>();
        let reply = Reply::<PlainEngine> { ciphertexts };

        let bytes = reply.to_bytes(&engine);
        let recovered = Reply::<PlainEngine>::from_bytes(&engine, &bytes).unwrap();

        assert_eq!(recovered.ciphertext_count(), count);
        assert_eq!(recovered, reply);
    }

    #[test]
    fn galois_keys_wire_round_trip() {
        let (params, engine) = setup(2);
        let client = Client::new(engine, params, 1001).unwrap();

        let keys = client.generate_galois_keys().unwrap();
        let recovered = GaloisKeys::from_bytes(&keys.to_bytes()).unwrap();

        assert_eq!(recovered, keys);
    }

    #[test]
    fn reply_with_dangling_payload_is_rejected() {
        let (params, engine) = setup(2);
        let mut client = Client::new(engine.clone(), params.clone(), 9).unwrap();
        let mut server = Server::new(engine.clone(), params.clone()).unwrap();

        let mut db = vec![0u8; params.num_items() * params.item_bytes()];
        ChaCha8Rng::from_os_rng().fill_bytes(&mut db);
        server.setup_database(&db).unwrap();
        server.preprocess_database().unwrap();
        server.set_galois_key(9, &client.generate_galois_keys().unwrap()).unwrap();

        let query = client.generate_query(0).unwrap();
        let reply = server.generate_reply(&query, 9).unwrap();

        let mut bytes = reply.to_bytes(&engine);
        bytes.push(0);

        assert_eq!(Reply::<PlainEngine>::from_bytes(&engine, &bytes), Err(PhocaPIRError::CiphertextBufferLengthMismatch));
    }

    #[test]
    fn truncated_headers_are_rejected() {
        let (params, engine) = setup(2);
        let mut client = Client::new(engine.clone(), params, 5).unwrap();

        let query = client.generate_query(1).unwrap();
        let bytes = query.to_bytes(&engine);

        assert_eq!(Query::<PlainEngine>::from_bytes(&engine, &bytes[..3]), Err(PhocaPIRError::TruncatedSerializedBuffer));
        assert_eq!(Query::<PlainEngine>::from_bytes(&engine, &bytes[..11]), Err(PhocaPIRError::TruncatedSerializedBuffer));
        assert_eq!(GaloisKeys::from_bytes(&[0u8; 5]), Err(PhocaPIRError::TruncatedSerializedBuffer));
    }

    #[test]
    fn query_with_shortened_payload_is_rejected() {
        let (params, engine) = setup(2);
        let mut client = Client::new(engine.clone(), params, 5).unwrap();

        let query = client.generate_query(1).unwrap();
        let bytes = query.to_bytes(&engine);

        assert_eq!(
            Query::<PlainEngine>::from_bytes(&engine, &bytes[..bytes.len() - 1]),
            Err(PhocaPIRError::CiphertextBufferLengthMismatch)
        );
    }

    #[test]
    fn foreign_ciphertext_size_is_rejected() {
        let (params, engine) = setup(2);
        let mut client = Client::new(engine.clone(), params, 5).unwrap();

        let query = client.generate_query(1).unwrap();
        let bytes = query.to_bytes(&engine);

        // an engine with a different polynomial degree declares a different fixed size
        let other_params = Parameters::new(64, 8, 64, 12, 2).unwrap();
        let other_engine = PlainEngine::new(&other_params);
        assert_eq!(Query::<PlainEngine>::from_bytes(&other_engine, &bytes), Err(PhocaPIRError::SerializedCiphertextSizeMismatch));
    }
}
