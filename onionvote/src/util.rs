use crate::Error;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::Path;

/// Smallest modulus that can carry an RSA-PSS signature over SHA-512
pub const MIN_KEY_BITS: usize = 1536;

pub const DEFAULT_KEY_BITS: usize = 2048;

pub fn generate_keypair(bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey), Error> {
    if bits < MIN_KEY_BITS {
        return Err(Error::KeyTooSmall(bits));
    }

    let mut csprng = rand::rngs::OsRng;
    let secret = RsaPrivateKey::new(&mut csprng, bits)?;
    let public = secret.to_public_key();
    Ok((secret, public))
}

/// Read a PKCS#8 PEM private key
pub fn load_private_key<P: AsRef<Path>>(path: P) -> Result<RsaPrivateKey, Error> {
    let pem = fs::read_to_string(path)?;
    RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| Error::InvalidPrivateKey(e.to_string()))
}

/// Write a private key as PKCS#8 PEM
pub fn save_private_key<P: AsRef<Path>>(path: P, secret: &RsaPrivateKey) -> Result<(), Error> {
    let pem = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
    fs::write(path, pem.as_bytes())?;
    Ok(())
}
