//! PhocaPIR: single-server, index-based **P**rivate **I**nformation **R**etrieval over a pluggable leveled homomorphic-encryption engine.
//!
//! A client retrieves one item from a large server-held database by index, without the server learning which index.
//! The client encrypts a one-hot selection vector per recursion dimension; the server homomorphically folds the
//! database against those selections and returns a compact encrypted answer only the client can decode. All
//! cryptography is routed through the [`engine::HeEngine`] capability, so the protocol layer here owns parameter
//! derivation, index decomposition, oblivious query expansion, recursive reply folding and the wire formats, while
//! ciphertext mathematics stays behind the trait.
//!
//! ## Features
//!
//! * **Private retrieval by index:** the server sees only uniformly-encrypted selection vectors, never the index.
//! * **Two protocol-equivalent reply paths:** a one-shot `generate_reply`, and an explicit
//!   `expand_query` + `generate_reply_with_expanded_queries` pair for callers that reuse one expansion
//!   across several database shards.
//! * **Multi-tenant key management:** rotation keys are registered per client id in a concurrently readable
//!   table; a preprocessed server answers independent clients from `&self`.
//! * **Self-describing wire formats:** queries, expanded queries, replies and key material serialize to single
//!   length-validated byte buffers that cross any transport unmodified.
//!
//! ## Usage
//!
//! Add this crate (and an HE engine; the in-tree [`plain_engine::PlainEngine`] reference engine is insecure and
//! only for tests and examples) to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! phoca_pir = "=0.2.0"
//! rand = "=0.9.0"
//! rand_chacha = "=0.9.0"
//! ```
//!
//! Then, you can use it in your code:
//!
//! ```rust
//! use phoca_pir::{Parameters, client::Client, plain_engine::PlainEngine, server::Server};
//! use rand::prelude::*;
//! use rand_chacha::ChaCha8Rng;
//!
//! fn main() {
//!     const NUM_ITEMS: usize = 64;
//!     const ITEM_BYTES: usize = 8;
//!
//!     let params = Parameters::new(NUM_ITEMS, ITEM_BYTES, 64, 12, 2).expect("Parameter derivation failed");
//!
//!     // Server setup (offline phase)
//!     let mut rng = ChaCha8Rng::from_os_rng();
//!     let mut db = vec![0u8; NUM_ITEMS * ITEM_BYTES];
//!     rng.fill_bytes(&mut db);
//!
//!     let mut server = Server::new(PlainEngine::new(&params), params.clone()).expect("Server setup failed");
//!     server.setup_database(&db).expect("Database ingestion failed");
//!     server.preprocess_database().expect("Database preprocessing failed");
//!
//!     // Client setup (offline phase): register rotation keys under this client's id
//!     let mut client = Client::new(PlainEngine::new(&params), params.clone(), 42).expect("Client setup failed");
//!     let galois_keys = client.generate_galois_keys().expect("Key generation failed");
//!     server.set_galois_key(client.client_id(), &galois_keys).expect("Key registration failed");
//!
//!     // Online phase: retrieve item 33 without revealing the index
//!     let elem_index = 33;
//!     let query = client.generate_query(client.fv_index(elem_index)).expect("Query generation failed");
//!     let reply = server.generate_reply(&query, client.client_id()).expect("Server failed to reply");
//!
//!     let slot_bytes = client.decode_reply(&reply).expect("Reply decoding failed");
//!     let begin = client.fv_offset(elem_index) * ITEM_BYTES;
//!     assert_eq!(&slot_bytes[begin..begin + ITEM_BYTES], &db[elem_index * ITEM_BYTES..(elem_index + 1) * ITEM_BYTES]);
//! }
//! ```
//!
//! ## Modules
//!
//! * `client`: the `Client` struct building queries and decoding replies, plus the `Query` and `GaloisKeys` types it produces.
//! * `server`: the `Server` struct owning the preprocessed database and per-client key table, plus `ExpandedQuery` and `Reply`.
//! * `engine`: the `HeEngine` capability trait and the `Plaintext` coefficient type shared across the boundary.
//! * `plain_engine`: an insecure plaintext-arithmetic reference engine for tests, benches and documentation.

pub use pir_internals::error::PhocaPIRError;
pub use pir_internals::params::{MAX_PLAIN_MODULUS_BIT_LEN, Parameters, SUPPORTED_RECURSION_DEPTHS};

pub mod client;
pub mod engine;
pub mod plain_engine;
pub mod server;

mod pir_internals;

mod test_pir;
