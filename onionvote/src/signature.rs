use crate::Error;
use digest::Digest;
use rand_core::{CryptoRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;

/// Width in bytes of a signature made by the holder of this key
#[inline]
pub fn signature_size<K: PublicKeyParts>(key: &K) -> usize {
    key.size()
}

/// Hash the message with SHA-512 and sign the digest with RSA-PSS.
pub fn sign(secret: &RsaPrivateKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    sign_with_rng(&mut rand::rngs::OsRng, secret, msg)
}

pub fn sign_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret: &RsaPrivateKey,
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    let hashed = Sha512::digest(msg);
    let signature = secret.sign_with_rng(rng, Pss::new::<Sha512>(), &hashed)?;
    Ok(signature)
}

/// Verify an RSA-PSS / SHA-512 signature over the message.
pub fn verify(
    public: &RsaPublicKey,
    signature: &[u8],
    msg: &[u8],
) -> Result<(), rsa::errors::Error> {
    let hashed = Sha512::digest(msg);
    public.verify(Pss::new::<Sha512>(), &hashed, signature)
}

/// Sign a ballot and append the signature to it.
pub fn attach(secret: &RsaPrivateKey, mut ballot: Vec<u8>) -> Result<Vec<u8>, Error> {
    let signature = sign(secret, &ballot)?;
    ballot.extend(signature);
    Ok(ballot)
}

/// Verify the trailing signature block of a signed ballot and strip it.
///
/// Only the last `signature_size(public)` bytes are treated as the signature.
pub fn verify_and_strip(
    public: &RsaPublicKey,
    mut signed: Vec<u8>,
) -> Result<Vec<u8>, rsa::errors::Error> {
    let width = signature_size(public);
    if signed.len() < width {
        return Err(rsa::errors::Error::Verification);
    }

    let signature = signed.split_off(signed.len() - width);
    verify(public, &signature, &signed)?;
    Ok(signed)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::tests::keypair;

    #[test]
    fn test_sign_verify() {
        let (secret, public) = keypair(0);
        let msg = b"the river gets ten votes";

        let signature = sign(secret, msg).unwrap();
        assert_eq!(signature.len(), signature_size(public));
        verify(public, &signature, msg).unwrap();

        // Randomized padding
        let again = sign(secret, msg).unwrap();
        assert_ne!(signature, again);
        verify(public, &again, msg).unwrap();

        // Wrong message
        assert!(verify(public, &signature, b"the river gets eleven votes").is_err());

        // Wrong key
        let (_, other_public) = keypair(1);
        assert!(verify(other_public, &signature, msg).is_err());
    }

    #[test]
    fn test_attach_and_strip() {
        let (secret, public) = keypair(2);
        let ballot = b"opaque ballot bytes".to_vec();

        let signed = attach(secret, ballot.clone()).unwrap();
        assert_eq!(signed.len(), ballot.len() + signature_size(public));
        assert_eq!(&signed[..ballot.len()], &ballot[..]);

        let stripped = verify_and_strip(public, signed.clone()).unwrap();
        assert_eq!(stripped, ballot);

        // Any mutated byte is caught
        let mut tampered = signed.clone();
        tampered[0] ^= 0x01;
        assert!(verify_and_strip(public, tampered).is_err());

        let mut tampered = signed;
        let last = tampered.len() - 1;
        tampered[last] ^= 0x80;
        assert!(verify_and_strip(public, tampered).is_err());

        // Too short to even hold a signature
        assert!(verify_and_strip(public, vec![0u8; 10]).is_err());
    }
}
