use divan;
use phoca_pir::{Parameters, client::Client, plain_engine::PlainEngine, server::Server};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

fn main() {
    divan::main();
}

#[derive(Debug)]
struct DBConfig {
    num_items: usize,
    item_bytes: usize,
    poly_degree: usize,
    plain_modulus_bit_len: usize,
}

const ARGS: &[DBConfig] = &[DBConfig {
    num_items: 1usize << 10,
    item_bytes: 32,
    poly_degree: 256,
    plain_modulus_bit_len: 12,
}];
const DIMS: [usize; 2] = [2, 3];

fn generate_random_db(rng: &mut ChaCha8Rng, num_items: usize, item_bytes: usize) -> Vec<u8> {
    let mut db = vec![0u8; num_items * item_bytes];
    rng.fill_bytes(&mut db);
    db
}

#[divan::bench(args = ARGS, consts = DIMS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn server_setup<const DIM: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let params = Parameters::new(db_config.num_items, db_config.item_bytes, db_config.poly_degree, db_config.plain_modulus_bit_len, DIM).unwrap();

    let mut rng = ChaCha8Rng::from_os_rng();
    let db = generate_random_db(&mut rng, db_config.num_items, db_config.item_bytes);

    bencher
        .with_inputs(|| Server::new(PlainEngine::new(&params), params.clone()).unwrap())
        .bench_values(|mut server| {
            server.setup_database(divan::black_box(&db)).unwrap();
            server.preprocess_database().unwrap();
            server
        });
}

#[divan::bench(args = ARGS, consts = DIMS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn client_key_generation<const DIM: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let params = Parameters::new(db_config.num_items, db_config.item_bytes, db_config.poly_degree, db_config.plain_modulus_bit_len, DIM).unwrap();
    let client = Client::new(PlainEngine::new(&params), params.clone(), 1).unwrap();

    bencher.bench(|| divan::black_box(&client).generate_galois_keys());
}
