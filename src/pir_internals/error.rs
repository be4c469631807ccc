use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq)]
pub enum PhocaPIRError {
    // Parameters
    InvalidParameterValue,
    UnsupportedRecursionDepth(usize),
    PolyDegreeNotPowerOfTwo,
    PlainModulusBitLenOutOfRange,
    ItemTooLargeForPlaintext,

    // Database
    DatabaseSizeMismatch,
    DatabaseAlreadySet,
    DatabaseNotStaged,
    DatabaseAlreadyPreprocessed,
    DatabaseNotPreprocessed,

    // Protocol
    PlaintextSlotOutOfRange,
    NoPendingQuery,
    QueryDimensionCountMismatch,
    SelectionVectorLengthMismatch,
    ReplyCiphertextCountMismatch,
    QueryClientIdMismatch,
    GaloisKeyClientIdMismatch,
    ScaleNotInvertible,

    // Keys
    GaloisKeysNotFoundForClient(u64),

    // Wire
    TruncatedSerializedBuffer,
    CiphertextBufferLengthMismatch,
    SerializedCiphertextSizeMismatch,

    // Engine
    InvalidPlaintextLength,
    CiphertextKeyMismatch,
    GaloisElementNotInKeys(u32),
}

impl Display for PhocaPIRError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameterValue => write!(f, "Item count, item byte length and polynomial degree must all be non-zero."),
            Self::UnsupportedRecursionDepth(d) => write!(f, "Recursion depth of '{}' is not supported, it must be either 2 or 3.", d),
            Self::PolyDegreeNotPowerOfTwo => write!(f, "The polynomial degree must be a power of two."),
            Self::PlainModulusBitLenOutOfRange => write!(f, "The plaintext modulus bit length must be between 1 and 32."),
            Self::ItemTooLargeForPlaintext => write!(f, "A single item does not fit into the coefficient space of one plaintext."),

            Self::DatabaseSizeMismatch => write!(f, "The raw database byte length must be exactly 'num_items * item_bytes'."),
            Self::DatabaseAlreadySet => write!(f, "The database has already been ingested, it can be set only once."),
            Self::DatabaseNotStaged => write!(f, "No database bytes have been ingested yet, nothing to preprocess."),
            Self::DatabaseAlreadyPreprocessed => write!(f, "The database has already been preprocessed."),
            Self::DatabaseNotPreprocessed => write!(f, "The database must be preprocessed before replies can be generated."),

            Self::PlaintextSlotOutOfRange => write!(f, "Requested plaintext slot lies beyond the encoded database."),
            Self::NoPendingQuery => write!(f, "No query has been generated yet, so there is no state to decode a reply against."),
            Self::QueryDimensionCountMismatch => write!(f, "The number of query dimensions does not match the agreed parameters."),
            Self::SelectionVectorLengthMismatch => write!(f, "A per-dimension ciphertext group has an unexpected length."),
            Self::ReplyCiphertextCountMismatch => write!(f, "The reply holds an unexpected number of ciphertexts."),
            Self::QueryClientIdMismatch => write!(f, "The query is tagged with a different client id than the one it was submitted under."),
            Self::GaloisKeyClientIdMismatch => write!(f, "The rotation key blob is tagged with a different client id than the one it was registered under."),
            Self::ScaleNotInvertible => write!(f, "The expansion scale has no inverse modulo the engine's plaintext modulus."),

            Self::GaloisKeysNotFoundForClient(client_id) => write!(f, "No rotation keys are registered for client id '{}'.", client_id),

            Self::TruncatedSerializedBuffer => write!(f, "Serialized buffer ends before its declared header or payload."),
            Self::CiphertextBufferLengthMismatch => write!(f, "Serialized payload length is not 'ciphertext_size * count'."),
            Self::SerializedCiphertextSizeMismatch => write!(f, "Declared per-ciphertext size does not match the engine's fixed serialized size."),

            Self::InvalidPlaintextLength => write!(f, "Plaintext operand has the wrong coefficient count for this engine."),
            Self::CiphertextKeyMismatch => write!(f, "Ciphertext and key material originate from different keypairs."),
            Self::GaloisElementNotInKeys(galois_elt) => write!(f, "Rotation keys do not cover Galois element '{}'.", galois_elt),
        }
    }
}

impl Error for PhocaPIRError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
