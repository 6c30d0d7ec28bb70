use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use std::borrow::Cow;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`, hex of the DER SubjectPublicKeyInfo
pub enum RsaPublicKeyHex {}

impl Hex<RsaPublicKey> for RsaPublicKeyHex {
    type Error = String;

    fn create_bytes(public_key: &RsaPublicKey) -> Cow<'_, [u8]> {
        // DER encoding of a well-formed key does not fail
        public_key
            .to_public_key_der()
            .map(|der| Cow::Owned(der.as_bytes().to_vec()))
            .unwrap_or_default()
    }

    fn from_bytes(bytes: &[u8]) -> Result<RsaPublicKey, String> {
        RsaPublicKey::from_public_key_der(bytes).map_err(|e| format!("{}", e))
    }
}
