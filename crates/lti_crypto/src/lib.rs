//! lti_crypto — envelope-encryption primitives for the credential store
//!
//! A single caller-supplied secret is hashed down to a fixed 32-byte key;
//! payloads are sealed with AES-256-CBC under a fresh random IV per write and
//! travel as hex-encoded `{iv, data}` pairs.
//!
//! Confidentiality only: CBC produces no authentication tag, so tampering is
//! not reliably detected. See the notes on [`cipher`].

pub mod cipher;
pub mod error;

pub use cipher::{decrypt, derive_key, encrypt, Sealed, IV_LEN};
pub use error::CryptoError;
