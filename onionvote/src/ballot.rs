//! Onion ballots.
//!
//! A ballot is sealed in two passes over the chain, each pass encrypting for the last
//! voter first and the first voter last:
//!
//! - the *validation* pass wraps `vote || tag`, and is peeled during the second round
//!   after the batch has already been mixed;
//! - the *mixing* pass appends a fresh tag before every layer, and is peeled during the
//!   first round, where each voter uses the tags it generated to find its own ballot.
//!
//! All tags a voter generated are kept in its [`TagSet`] and never leave the session.

use crate::hybrid;
use crate::Error;
use rand_core::{CryptoRng, RngCore};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

/// Width of a ballot tag
pub const TAG_LENGTH: usize = 16;

pub type Tag = [u8; TAG_LENGTH];

/// An onion-encrypted ballot, possibly followed by a signature block
pub type Ballot = Vec<u8>;

/// The ballots exchanged as a unit between rounds
pub type BallotBatch = Vec<Ballot>;

/// Tags generated while sealing one's own ballot
#[derive(Clone, Default)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    fn generate<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Tag, Error> {
        let mut tag = [0u8; TAG_LENGTH];
        rng.try_fill_bytes(&mut tag)?;
        self.tags.push(tag);
        Ok(tag)
    }

    /// Check whether a trailing tag was generated by us
    pub fn contains(&self, tag: &[u8]) -> bool {
        self.tags.iter().any(|t| t[..] == *tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

// Tags identify our ballot, so never print them
impl fmt::Debug for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TagSet({} tags)", self.tags.len())
    }
}

/// Seal a vote for the given chain of public keys.
pub fn build<R: RngCore + CryptoRng>(
    rng: &mut R,
    vote: &[u8],
    chain: &[RsaPublicKey],
) -> Result<(Ballot, TagSet), Error> {
    let mut tags = TagSet::default();

    let sealed = seal_validation_layers(rng, vote, chain, &mut tags)?;
    let sealed = seal_mixing_layers(rng, sealed, chain, &mut tags)?;

    Ok((sealed, tags))
}

// E_0(E_1(...E_n(vote || tag)))
fn seal_validation_layers<R: RngCore + CryptoRng>(
    rng: &mut R,
    vote: &[u8],
    chain: &[RsaPublicKey],
    tags: &mut TagSet,
) -> Result<Vec<u8>, Error> {
    let mut sealed = Vec::with_capacity(vote.len() + TAG_LENGTH);
    sealed.extend_from_slice(vote);
    sealed.extend_from_slice(&tags.generate(rng)?);

    for public_key in chain.iter().rev() {
        sealed = hybrid::encrypt_with_rng(rng, public_key, &sealed)?;
    }

    Ok(sealed)
}

// E_0(E_1(...E_n(inner || tag_n)...|| tag_1) || tag_0)
fn seal_mixing_layers<R: RngCore + CryptoRng>(
    rng: &mut R,
    mut sealed: Vec<u8>,
    chain: &[RsaPublicKey],
    tags: &mut TagSet,
) -> Result<Vec<u8>, Error> {
    for public_key in chain.iter().rev() {
        sealed.extend_from_slice(&tags.generate(rng)?);
        sealed = hybrid::encrypt_with_rng(rng, public_key, &sealed)?;
    }

    Ok(sealed)
}

/// Peel one mixing layer and report whether its tag is one of ours.
///
/// The returned payload has the tag stripped and is ready for the next voter.
pub fn peel_and_check(
    ballot: &[u8],
    secret: &RsaPrivateKey,
    tags: &TagSet,
) -> Result<(Vec<u8>, bool), Error> {
    let mut payload = hybrid::decrypt(secret, ballot)?;
    if payload.len() < TAG_LENGTH {
        return Err(Error::MalformedCiphertext("layer is shorter than a tag"));
    }

    let tag = payload.split_off(payload.len() - TAG_LENGTH);
    let own = tags.contains(&tag);
    Ok((payload, own))
}

/// Peel one validation layer.
pub fn peel(ballot: &[u8], secret: &RsaPrivateKey) -> Result<Vec<u8>, Error> {
    hybrid::decrypt(secret, ballot)
}

/// Strip the innermost tag from a fully peeled ballot, leaving the vote.
pub fn open(payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() < TAG_LENGTH {
        return Err(Error::MalformedCiphertext(
            "peeled ballot is shorter than a tag",
        ));
    }
    Ok(payload[..payload.len() - TAG_LENGTH].to_vec())
}
