use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Delete requires a non-empty filter")]
    MissingFilter,

    #[error("Modify requires a non-empty patch")]
    MissingPatch,

    #[error("Encrypted insert requires an index naming the primary-key field")]
    MissingIndex,

    #[error("Unknown column \"{column}\" in table {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("Column \"{0}\" is managed by the store and cannot be patched")]
    ImmutableColumn(&'static str),

    #[error("Expected a JSON object payload")]
    NotAnObject,

    #[error("Row in table {0} carries no iv/data envelope to decrypt")]
    MissingEnvelope(&'static str),

    #[error("Crypto error: {0}")]
    Crypto(#[from] lti_crypto::CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unparseable stored timestamp: {0}")]
    Timestamp(String),
}
