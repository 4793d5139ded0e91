use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("IV must be exactly 16 bytes, got {0}")]
    InvalidIv(usize),

    #[error("Decryption failed (wrong secret or corrupted ciphertext)")]
    Decrypt,

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}
