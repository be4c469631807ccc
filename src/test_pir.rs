#![cfg(test)]

use crate::{
    client::{Client, GaloisKeys},
    pir_internals::error::PhocaPIRError,
    plain_engine::PlainEngine,
    server::{Reply, Server},
    Parameters,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use test_case::test_case;

fn generate_random_db(rng: &mut ChaCha8Rng, num_items: usize, item_bytes: usize) -> Vec<u8> {
    let mut db = vec![0u8; num_items * item_bytes];
    rng.fill_bytes(&mut db);
    db
}

fn setup_pir(params: &Parameters, client_id: u64, db: &[u8]) -> (Client<PlainEngine>, Server<PlainEngine>) {
    let mut server = Server::new(PlainEngine::new(params), params.clone()).expect("Server setup failed");
    server.setup_database(db).expect("Database ingestion failed");
    server.preprocess_database().expect("Database preprocessing failed");

    let client = Client::new(PlainEngine::new(params), params.clone(), client_id).expect("Client setup failed");
    server.set_galois_key(client_id, &client.generate_galois_keys().unwrap()).expect("Key registration failed");

    (client, server)
}

fn retrieved_item(client: &Client<PlainEngine>, reply: &Reply<PlainEngine>, elem_index: usize) -> Vec<u8> {
    let item_bytes = client.params().item_bytes();
    let slot_bytes = client.decode_reply(reply).expect("Reply decoding failed");

    let begin = client.fv_offset(elem_index) * item_bytes;
    slot_bytes[begin..begin + item_bytes].to_vec()
}

#[test_case(2; "two dims")]
#[test_case(3; "three dims")]
fn round_trip_over_every_index(dimension_count: usize) {
    const NUM_ITEMS: usize = 100;
    const ITEM_BYTES: usize = 6;

    let params = Parameters::new(NUM_ITEMS, ITEM_BYTES, 16, 12, dimension_count).unwrap();
    let engine = PlainEngine::new(&params);

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, NUM_ITEMS, ITEM_BYTES);
    let (mut client, server) = setup_pir(&params, 1, &db);

    for elem_index in 0..NUM_ITEMS {
        let query = client.generate_query(client.fv_index(elem_index)).unwrap();

        // push query and reply through their wire forms, like a real deployment would
        let query = crate::client::Query::from_bytes(&engine, &query.to_bytes(&engine)).unwrap();
        let reply = server.generate_reply(&query, 1).unwrap();
        let reply = Reply::from_bytes(&engine, &reply.to_bytes(&engine)).unwrap();

        let expected = &db[elem_index * ITEM_BYTES..(elem_index + 1) * ITEM_BYTES];
        assert_eq!(retrieved_item(&client, &reply, elem_index), expected, "elem_index = {}", elem_index);
    }
}

#[test_case(2; "two dims")]
#[test_case(3; "three dims")]
fn direct_and_expanded_paths_agree(dimension_count: usize) {
    const NUM_ITEMS: usize = 60;
    const ITEM_BYTES: usize = 6;

    let params = Parameters::new(NUM_ITEMS, ITEM_BYTES, 16, 12, dimension_count).unwrap();
    let engine = PlainEngine::new(&params);

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, NUM_ITEMS, ITEM_BYTES);
    let (mut client, server) = setup_pir(&params, 23, &db);

    for _ in 0..8 {
        let elem_index = rng.random_range(0..NUM_ITEMS);
        let query = client.generate_query(client.fv_index(elem_index)).unwrap();

        let direct_reply = server.generate_reply(&query, 23).unwrap();

        let expanded = server.expand_query(&query, 23).unwrap();
        let expanded = crate::server::ExpandedQuery::from_bytes(&engine, &expanded.to_bytes(&engine)).unwrap();
        let two_phase_reply = server.generate_reply_with_expanded_queries(&expanded, 23).unwrap();

        let direct_bytes = client.decode_reply(&direct_reply).unwrap();
        let two_phase_bytes = client.decode_reply(&two_phase_reply).unwrap();

        assert_eq!(direct_bytes, two_phase_bytes);
        assert_eq!(
            retrieved_item(&client, &direct_reply, elem_index),
            &db[elem_index * ITEM_BYTES..(elem_index + 1) * ITEM_BYTES]
        );
    }
}

#[test]
fn single_item_database() {
    let params = Parameters::new(1, 4, 16, 12, 2).unwrap();
    assert!(params.dimension_sizes().iter().all(|&n| n == 1));

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 1, 4);
    let (mut client, server) = setup_pir(&params, 0, &db);

    let query = client.generate_query(client.fv_index(0)).unwrap();
    let reply = server.generate_reply(&query, 0).unwrap();

    assert_eq!(retrieved_item(&client, &reply, 0), db);
}

#[test]
fn item_exactly_fills_plaintext() {
    // 16 coefficients * 12 bits = 24 bytes: one item per plaintext, no headroom
    const NUM_ITEMS: usize = 10;
    const ITEM_BYTES: usize = 24;

    let params = Parameters::new(NUM_ITEMS, ITEM_BYTES, 16, 12, 2).unwrap();
    assert_eq!(params.items_per_plaintext(), 1);

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, NUM_ITEMS, ITEM_BYTES);
    let (mut client, server) = setup_pir(&params, 5, &db);

    for elem_index in 0..NUM_ITEMS {
        let query = client.generate_query(client.fv_index(elem_index)).unwrap();
        let reply = server.generate_reply(&query, 5).unwrap();

        let expected = &db[elem_index * ITEM_BYTES..(elem_index + 1) * ITEM_BYTES];
        assert_eq!(retrieved_item(&client, &reply, elem_index), expected, "elem_index = {}", elem_index);
    }
}

#[test]
fn dimension_larger_than_poly_degree() {
    // forces a dimension of 18 > poly_degree 16, so queries carry two packed
    // ciphertexts for that dimension and expansion runs in two batches
    const NUM_ITEMS: usize = 300;
    const ITEM_BYTES: usize = 16;

    let params = Parameters::new(NUM_ITEMS, ITEM_BYTES, 16, 8, 2).unwrap();
    assert!(params.dimension_sizes().iter().any(|&n| n > params.poly_degree()));

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, NUM_ITEMS, ITEM_BYTES);
    let (mut client, server) = setup_pir(&params, 77, &db);

    // sample the index space, making sure both expansion batches of the wide
    // dimension are hit (slots >= 272 put the leading digit into the second batch)
    let mut elem_indices: Vec<usize> = (0..NUM_ITEMS).step_by(13).collect();
    elem_indices.extend([270, 272, 285, 299]);

    for elem_index in elem_indices {
        let query = client.generate_query(client.fv_index(elem_index)).unwrap();
        let reply = server.generate_reply(&query, 77).unwrap();

        let expected = &db[elem_index * ITEM_BYTES..(elem_index + 1) * ITEM_BYTES];
        assert_eq!(retrieved_item(&client, &reply, elem_index), expected, "elem_index = {}", elem_index);
    }
}

#[test]
fn reply_paths_demand_preprocessed_database() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut client = Client::new(PlainEngine::new(&params), params.clone(), 3).unwrap();
    let server = Server::new(PlainEngine::new(&params), params.clone()).unwrap();
    server.set_galois_key(3, &client.generate_galois_keys().unwrap()).unwrap();

    let query = client.generate_query(0).unwrap();
    assert_eq!(server.generate_reply(&query, 3), Err(PhocaPIRError::DatabaseNotPreprocessed));

    let expanded = server.expand_query(&query, 3).unwrap();
    assert_eq!(
        server.generate_reply_with_expanded_queries(&expanded, 3),
        Err(PhocaPIRError::DatabaseNotPreprocessed)
    );

    // staged but not preprocessed is still not servable
    let db = vec![0u8; params.num_items() * params.item_bytes()];
    let mut server = server;
    server.setup_database(&db).unwrap();
    assert_eq!(server.generate_reply(&query, 3), Err(PhocaPIRError::DatabaseNotPreprocessed));
}

#[test]
fn database_lifecycle_is_one_shot() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();
    let mut server = Server::new(PlainEngine::new(&params), params.clone()).unwrap();
    let db = vec![0u8; params.num_items() * params.item_bytes()];

    assert_eq!(server.preprocess_database(), Err(PhocaPIRError::DatabaseNotStaged));
    assert_eq!(server.setup_database(&db[1..]), Err(PhocaPIRError::DatabaseSizeMismatch));

    server.setup_database(&db).unwrap();
    assert_eq!(server.setup_database(&db), Err(PhocaPIRError::DatabaseAlreadySet));

    server.preprocess_database().unwrap();
    assert_eq!(server.preprocess_database(), Err(PhocaPIRError::DatabaseAlreadyPreprocessed));
    assert_eq!(server.setup_database(&db), Err(PhocaPIRError::DatabaseAlreadySet));
}

#[test]
fn unregistered_client_cannot_be_served() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 64, 8);
    let (_, server) = setup_pir(&params, 1, &db);

    let mut stranger = Client::new(PlainEngine::new(&params), params.clone(), 2).unwrap();
    let query = stranger.generate_query(0).unwrap();

    assert_eq!(server.expand_query(&query, 2), Err(PhocaPIRError::GaloisKeysNotFoundForClient(2)));
    assert_eq!(server.generate_reply(&query, 2), Err(PhocaPIRError::GaloisKeysNotFoundForClient(2)));
}

#[test]
fn client_id_mismatches_are_rejected() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 64, 8);
    let (mut client, server) = setup_pir(&params, 1, &db);

    let query = client.generate_query(0).unwrap();
    assert_eq!(server.generate_reply(&query, 9), Err(PhocaPIRError::QueryClientIdMismatch));

    let keys = client.generate_galois_keys().unwrap();
    assert_eq!(server.set_galois_key(9, &keys), Err(PhocaPIRError::GaloisKeyClientIdMismatch));

    // a rotation-key blob rebuilt for another id via the wire form is caught too
    let mut key_bytes = keys.to_bytes();
    key_bytes[0] ^= 0xFF;
    let forged = GaloisKeys::from_bytes(&key_bytes).unwrap();
    assert_eq!(server.set_galois_key(1, &forged), Err(PhocaPIRError::GaloisKeyClientIdMismatch));
}

#[test]
fn malformed_expanded_query_is_rejected() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 64, 8);
    let (mut client, server) = setup_pir(&params, 4, &db);

    let query = client.generate_query(0).unwrap();

    let mut truncated = server.expand_query(&query, 4).unwrap();
    truncated.dimension_groups[0].pop();
    assert_eq!(
        server.generate_reply_with_expanded_queries(&truncated, 4),
        Err(PhocaPIRError::SelectionVectorLengthMismatch)
    );

    let mut missing_dim = server.expand_query(&query, 4).unwrap();
    missing_dim.dimension_groups.pop();
    assert_eq!(
        server.generate_reply_with_expanded_queries(&missing_dim, 4),
        Err(PhocaPIRError::QueryDimensionCountMismatch)
    );

    let mut short_query = query.clone();
    short_query.dimension_groups[0].clear();
    assert_eq!(server.expand_query(&short_query, 4), Err(PhocaPIRError::SelectionVectorLengthMismatch));
}

#[test]
fn decoding_needs_pending_query_state() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 64, 8);
    let (mut client, server) = setup_pir(&params, 6, &db);

    let query = client.generate_query(0).unwrap();
    let reply = server.generate_reply(&query, 6).unwrap();

    let fresh_client = Client::new(PlainEngine::new(&params), params.clone(), 6).unwrap();
    assert_eq!(fresh_client.decode_reply(&reply), Err(PhocaPIRError::NoPendingQuery));

    assert_eq!(
        client.generate_query(params.num_plaintexts()),
        Err(PhocaPIRError::PlaintextSlotOutOfRange)
    );
}

#[test]
fn reply_for_another_client_does_not_decode() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 64, 8);
    let (mut alice, server) = setup_pir(&params, 1, &db);

    let mut eve = Client::new(PlainEngine::new(&params), params.clone(), 2).unwrap();
    server.set_galois_key(2, &eve.generate_galois_keys().unwrap()).unwrap();

    let query = alice.generate_query(alice.fv_index(7)).unwrap();
    let reply = server.generate_reply(&query, 1).unwrap();

    // give eve pending-query state of her own, then hand her alice's reply
    let _ = eve.generate_query(0).unwrap();
    assert_eq!(eve.decode_reply(&reply), Err(PhocaPIRError::CiphertextKeyMismatch));
}

#[test]
fn reregistration_replaces_key_material() {
    let params = Parameters::new(64, 8, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, 64, 8);
    let (mut client, server) = setup_pir(&params, 11, &db);

    // a second registration under the same id wins; queries keep working because the
    // key material still belongs to the same keypair
    server.set_galois_key(11, &client.generate_galois_keys().unwrap()).unwrap();

    let elem_index = 19;
    let query = client.generate_query(client.fv_index(elem_index)).unwrap();
    let reply = server.generate_reply(&query, 11).unwrap();

    assert_eq!(
        retrieved_item(&client, &reply, elem_index),
        &db[elem_index * 8..(elem_index + 1) * 8]
    );
}

#[test]
fn server_answers_clients_concurrently() {
    const NUM_ITEMS: usize = 64;
    const ITEM_BYTES: usize = 8;

    let params = Parameters::new(NUM_ITEMS, ITEM_BYTES, 16, 12, 2).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, NUM_ITEMS, ITEM_BYTES);

    let mut server = Server::new(PlainEngine::new(&params), params.clone()).unwrap();
    server.setup_database(&db).unwrap();
    server.preprocess_database().unwrap();
    let server = server;

    std::thread::scope(|scope| {
        for client_id in 0..4u64 {
            let server = &server;
            let params = &params;
            let db = &db;

            scope.spawn(move || {
                let mut client = Client::new(PlainEngine::new(params), params.clone(), client_id).unwrap();
                server.set_galois_key(client_id, &client.generate_galois_keys().unwrap()).unwrap();

                let elem_index = (client_id as usize * 17) % NUM_ITEMS;
                let query = client.generate_query(client.fv_index(elem_index)).unwrap();
                let reply = server.generate_reply(&query, client_id).unwrap();

                let retrieved = retrieved_item(&client, &reply, elem_index);
                assert_eq!(retrieved, &db[elem_index * ITEM_BYTES..(elem_index + 1) * ITEM_BYTES]);
            });
        }
    });
}
