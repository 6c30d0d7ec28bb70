//! Hybrid RSA / AES-CTR encryption used to build and peel onion layers.
//!
//! Every call to [`encrypt`] draws a fresh 128 bit AES key, wraps it with raw RSA
//! under the receiver's public key and encrypts the payload with AES-128 in CTR mode.
//! The CTR nonce is all zeroes, which is only sound because a symmetric key is never
//! used for more than one message.
//!
//! Ciphertext layout: `wrapped_key (modulus width) || encrypted_payload (payload width)`.

use crate::Error;
use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand_core::{CryptoRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Width of the per-layer symmetric key
pub const SYMMETRIC_KEY_LENGTH: usize = 16;

const ZERO_NONCE: [u8; 16] = [0u8; 16];

/// Width in bytes of the wrapped symmetric key for this receiver
#[inline]
pub fn wrapped_key_size<K: PublicKeyParts>(key: &K) -> usize {
    key.size()
}

/// Encrypt a message so that only the holder of the matching private key can read it.
pub fn encrypt(receiver_pub: &RsaPublicKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    encrypt_with_rng(&mut rand::rngs::OsRng, receiver_pub, msg)
}

/// Like [`encrypt`], drawing the symmetric key from the given generator.
pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    receiver_pub: &RsaPublicKey,
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
    rng.try_fill_bytes(&mut key)?;

    let wrapped = wrap_key(receiver_pub, &key);
    let encrypted = aes_ctr(&key, msg)?;

    let mut cipher_text = Vec::with_capacity(wrapped.len() + encrypted.len());
    cipher_text.extend(wrapped);
    cipher_text.extend(encrypted);

    Ok(cipher_text)
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// Fails with `MalformedCiphertext` when the buffer is shorter than the wrapped key,
/// or when the unwrapped key cannot be a symmetric key (which is what a wrong private
/// key almost always yields).
pub fn decrypt(receiver_sec: &RsaPrivateKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    let width = wrapped_key_size(receiver_sec);
    if msg.len() < width {
        return Err(Error::MalformedCiphertext(
            "ciphertext is shorter than the wrapped key",
        ));
    }

    let (wrapped, encrypted) = msg.split_at(width);
    let key = unwrap_key(receiver_sec, wrapped)?;

    aes_ctr(&key, encrypted)
}

fn wrap_key(receiver_pub: &RsaPublicKey, key: &[u8; SYMMETRIC_KEY_LENGTH]) -> Vec<u8> {
    let m = BigUint::from_bytes_be(key);
    let c = m.modpow(receiver_pub.e(), receiver_pub.n());
    left_pad(&c.to_bytes_be(), wrapped_key_size(receiver_pub))
}

fn unwrap_key(
    receiver_sec: &RsaPrivateKey,
    wrapped: &[u8],
) -> Result<[u8; SYMMETRIC_KEY_LENGTH], Error> {
    let c = BigUint::from_bytes_be(wrapped);
    if &c >= receiver_sec.n() {
        return Err(Error::MalformedCiphertext(
            "wrapped key is out of range for this modulus",
        ));
    }

    let m = c.modpow(receiver_sec.d(), receiver_sec.n()).to_bytes_be();
    if m.len() > SYMMETRIC_KEY_LENGTH {
        return Err(Error::MalformedCiphertext(
            "unwrapped key does not fit the symmetric key width",
        ));
    }

    let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
    key[SYMMETRIC_KEY_LENGTH - m.len()..].copy_from_slice(&m);
    Ok(key)
}

fn aes_ctr(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut cipher =
        Aes128Ctr::new_from_slices(key, &ZERO_NONCE).map_err(|_| Error::CipherInit)?;

    let mut output = data.to_vec();
    cipher.apply_keystream(&mut output);
    Ok(output)
}

fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut padded = vec![0u8; width.saturating_sub(bytes.len())];
    padded.extend_from_slice(bytes);
    padded
}
