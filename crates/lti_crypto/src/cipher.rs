//! AES-256-CBC sealing of record payloads.
//!
//! Key: SHA-256 of the secret, truncated to 32 bytes — deterministic, so the
//! same secret always opens the same rows.  IV: 16 random bytes from the OS
//! RNG, drawn fresh on every encryption.  A reused IV across writes is a
//! correctness violation, not a style issue.
//!
//! There is no authentication tag.  A flipped ciphertext bit either fails the
//! PKCS7 unpad step or decrypts to garbage that the caller's JSON parse
//! rejects — neither is a cryptographic integrity guarantee.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// IV length in bytes; hex form is twice this.
pub const IV_LEN: usize = 16;

/// Hex-encoded IV + ciphertext pair — the only shape in which a sealed
/// payload leaves this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: String,
    pub data: String,
}

/// Derive the fixed 32-byte key for `secret`. Zeroized on drop.
pub fn derive_key(secret: &str) -> Zeroizing<[u8; 32]> {
    let digest = Sha256::digest(secret.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest[..32]);
    key
}

/// Seal `plaintext` under `secret` with a fresh random IV.
pub fn encrypt(plaintext: &[u8], secret: &str) -> Sealed {
    let key = derive_key(secret);
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let ciphertext =
        Aes256CbcEnc::new((&*key).into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Sealed {
        iv: hex::encode(iv),
        data: hex::encode(ciphertext),
    }
}

/// Open a sealed pair. Fails when the hex is malformed, the IV is not
/// 16 bytes, or the unpad step rejects the result (wrong secret or corrupted
/// ciphertext).
pub fn decrypt(data: &str, iv: &str, secret: &str) -> Result<Vec<u8>, CryptoError> {
    let iv_bytes = hex::decode(iv)?;
    let iv_len = iv_bytes.len();
    let iv: [u8; IV_LEN] = iv_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidIv(iv_len))?;
    let ciphertext = hex::decode(data)?;

    let key = derive_key(secret);
    Aes256CbcDec::new((&*key).into(), (&iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}
