//! One voter's run of the protocol.
//!
//! Every voter casts a ballot and also acts as a mix node for everyone else's:
//!
//! 1. The ballot is sent to the head of the chain, which collects one from every voter.
//! 2. The batch travels down the chain. Each voter shuffles it, peels one mixing layer
//!    off every ballot and checks that one of its own tags is still there.
//! 3. The batch travels down the chain again. Each voter checks the previous voter's
//!    signatures, peels one validation layer and signs every ballot.
//! 4. The tail broadcasts the fully peeled batch, and every voter checks the tail's
//!    signatures before opening the votes.

use crate::ballot::{self, TagSet};
use crate::signature;
use crate::transport::{ChainTransport, ChannelTransport, Envelope, Mailbox};
use crate::{shuffle, Ballot, BallotBatch, Error, TransportError, VotingConfig};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;

const HEAD: usize = 0;

/// Protocol states, in the order a session passes through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    CollectFirst,
    Shuffle,
    PeelFirst,
    ForwardFirst,
    CollectSecond,
    VerifyChain,
    PeelSecond,
    Sign,
    Exchange,
    Finalize,
}

/// The verified, fully decrypted batch seen by one voter.
///
/// Votes are in mixed order, which carries no link to who cast them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingResult {
    pub voter_index: usize,
    pub votes: Vec<Vec<u8>>,
}

impl VotingResult {
    /// How many times this exact vote appears
    pub fn count(&self, vote: &[u8]) -> usize {
        self.votes.iter().filter(|v| v.as_slice() == vote).count()
    }

    pub fn contains(&self, vote: &[u8]) -> bool {
        self.count(vote) > 0
    }
}

pub struct VoterSession<T = ChannelTransport> {
    config: Arc<VotingConfig>,
    index: usize,
    secret_key: RsaPrivateKey,
    tags: TagSet,
    stage: Stage,
    mailbox: Mailbox<T>,
}

impl VoterSession<ChannelTransport> {
    /// Start a session over a pair of channel handles
    pub fn new(
        config: Arc<VotingConfig>,
        secret_key: RsaPrivateKey,
        outbound: SyncSender<Envelope>,
        inbound: Receiver<Envelope>,
    ) -> Result<Self, Error> {
        Self::with_transport(config, secret_key, ChannelTransport::new(outbound, inbound))
    }
}

impl<T: ChainTransport> VoterSession<T> {
    /// Start a session over any transport.
    ///
    /// Fails with `NotAParticipant` if our public key is not in the roster.
    pub fn with_transport(
        config: Arc<VotingConfig>,
        secret_key: RsaPrivateKey,
        transport: T,
    ) -> Result<Self, Error> {
        config.validate()?;

        let public_key = secret_key.to_public_key();
        let index = config
            .position_of(&public_key)
            .ok_or(Error::NotAParticipant)?;
        let participants = config.len();

        Ok(VoterSession {
            config,
            index,
            secret_key,
            tags: TagSet::default(),
            stage: Stage::Create,
            mailbox: Mailbox::new(transport, index, participants),
        })
    }

    /// Our position in the chain
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn participants(&self) -> usize {
        self.config.len()
    }

    /// Cast a vote and run the protocol to completion.
    ///
    /// Blocks until every round is done. The session ends with the result or the first error.
    pub fn vote(mut self, vote: &[u8]) -> Result<VotingResult, Error> {
        info!(
            "voter {}: starting session with {} voters",
            self.index,
            self.participants()
        );

        match self.run(vote) {
            Ok(result) => {
                info!("voter {}: session finished", self.index);
                Ok(result)
            }
            Err(e) => {
                error!(
                    "voter {}: session aborted at {:?}: {}",
                    self.index, self.stage, e
                );
                Err(e)
            }
        }
    }

    fn run(&mut self, vote: &[u8]) -> Result<VotingResult, Error> {
        self.enter(Stage::Create);
        let ballot = self.create_ballot(vote)?;
        self.mailbox.send(vec![ballot], HEAD)?;

        self.enter(Stage::CollectFirst);
        let mut batch = self.collect_first()?;

        self.enter(Stage::Shuffle);
        shuffle::shuffle(&mut batch)?;

        self.enter(Stage::PeelFirst);
        let batch = self.peel_first(batch)?;

        self.enter(Stage::ForwardFirst);
        let (previous, next, tail) = (self.previous(), self.next(), self.tail());
        self.mailbox.send(batch, next)?;

        self.enter(Stage::CollectSecond);
        let mut batch = self.collect_from(previous, 2)?;

        if self.index != HEAD {
            self.enter(Stage::VerifyChain);
            batch = self.verify_batch(batch, previous)?;
        }

        self.enter(Stage::PeelSecond);
        let batch = self.peel_second(batch)?;

        self.enter(Stage::Sign);
        let batch = self.sign_batch(batch)?;

        self.enter(Stage::Exchange);
        let batch = if self.is_tail() {
            for target in 0..tail {
                self.mailbox.send(batch.clone(), target)?;
            }
            batch
        } else {
            self.mailbox.send(batch, next)?;
            self.collect_from(tail, 3)?
        };

        self.enter(Stage::Finalize);
        self.finalize(batch)
    }

    fn enter(&mut self, stage: Stage) {
        debug!("voter {}: {:?}", self.index, stage);
        self.stage = stage;
    }

    fn create_ballot(&mut self, vote: &[u8]) -> Result<Ballot, Error> {
        let chain = self.config.public_keys();
        let (sealed, tags) = ballot::build(&mut rand::rngs::OsRng, vote, &chain)?;
        self.tags = tags;
        Ok(sealed)
    }

    // The head takes exactly one single-ballot batch from every voter, itself included.
    // Everyone else takes the whole batch from the previous voter.
    fn collect_first(&mut self) -> Result<BallotBatch, Error> {
        if self.index != HEAD {
            let previous = self.previous();
            return self.collect_from(previous, 1);
        }

        let participants = self.participants();
        let mut batch = BallotBatch::with_capacity(participants);
        for sender in 0..participants {
            let mut single = self.mailbox.receive_from(sender)?;
            if single.len() != 1 {
                return Err(Error::BadBatchCount {
                    round: 1,
                    expected: 1,
                    found: single.len(),
                });
            }
            batch.append(&mut single);
        }
        Ok(batch)
    }

    fn collect_from(&mut self, sender: usize, round: u8) -> Result<BallotBatch, Error> {
        let batch = self.mailbox.receive_from(sender)?;
        if batch.len() != self.participants() {
            return Err(Error::BadBatchCount {
                round,
                expected: self.participants(),
                found: batch.len(),
            });
        }
        Ok(batch)
    }

    // Ballots that do not open under our key are spoiled: they are carried on as they are,
    // so one bad ballot cannot stop the whole chain.
    fn peel_first(&self, batch: BallotBatch) -> Result<BallotBatch, Error> {
        let mut found = false;
        let mut peeled = BallotBatch::with_capacity(batch.len());

        for entry in batch {
            match ballot::peel_and_check(&entry, &self.secret_key, &self.tags) {
                Ok((payload, own)) => {
                    found |= own;
                    peeled.push(payload);
                }
                Err(Error::MalformedCiphertext(reason)) => {
                    warn!("voter {}: spoiled ballot in round 1: {}", self.index, reason);
                    peeled.push(entry);
                }
                Err(e) => return Err(e),
            }
        }

        if !found {
            return Err(Error::BallotMissing);
        }
        Ok(peeled)
    }

    // Past the first round every layer must open; one that does not was substituted upstream.
    fn peel_second(&self, batch: BallotBatch) -> Result<BallotBatch, Error> {
        batch
            .into_iter()
            .enumerate()
            .map(|(entry, b)| {
                ballot::peel(&b, &self.secret_key).map_err(|e| malformed(e, 2, entry))
            })
            .collect()
    }

    fn verify_batch(&self, batch: BallotBatch, signer: usize) -> Result<BallotBatch, Error> {
        let public_key = self.signer_key(signer)?;

        batch
            .into_iter()
            .enumerate()
            .map(|(entry, b)| {
                signature::verify_and_strip(public_key, b)
                    .map_err(|_| Error::SignatureVerificationFailed { signer, entry })
            })
            .collect()
    }

    fn sign_batch(&self, batch: BallotBatch) -> Result<BallotBatch, Error> {
        batch
            .into_iter()
            .map(|b| signature::attach(&self.secret_key, b))
            .collect()
    }

    fn finalize(&self, batch: BallotBatch) -> Result<VotingResult, Error> {
        let batch = self.verify_batch(batch, self.tail())?;

        let votes = batch
            .iter()
            .enumerate()
            .map(|(entry, b)| ballot::open(b).map_err(|e| malformed(e, 3, entry)))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(VotingResult {
            voter_index: self.index,
            votes,
        })
    }

    fn signer_key(&self, signer: usize) -> Result<&RsaPublicKey, Error> {
        self.config
            .public_key(signer)
            .ok_or_else(|| TransportError::UnknownParticipant(signer).into())
    }

    fn next(&self) -> usize {
        (self.index + 1) % self.participants()
    }

    fn previous(&self) -> usize {
        let n = self.participants();
        (n + self.index - 1) % n
    }

    fn tail(&self) -> usize {
        self.participants() - 1
    }

    fn is_tail(&self) -> bool {
        self.index == self.tail()
    }
}

fn malformed(e: Error, round: u8, entry: usize) -> Error {
    match e {
        Error::MalformedCiphertext(reason) => Error::MalformedBallot {
            round,
            entry,
            reason,
        },
        e => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{keypair, public_keys};
    use crate::transport::LocalNetwork;

    #[test]
    fn test_not_a_participant() {
        let config = Arc::new(VotingConfig::from_public_keys(public_keys(2)));
        let mut transports = LocalNetwork::new(1).unwrap();
        let (outsider, _) = keypair(3);

        match VoterSession::with_transport(config, outsider.clone(), transports.remove(0)) {
            Err(Error::NotAParticipant) => {}
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("outsider was accepted"),
        }
    }

    #[test]
    fn test_chain_neighbours() {
        let config = Arc::new(VotingConfig::from_public_keys(public_keys(3)));
        let mut sessions = Vec::new();
        for (i, transport) in LocalNetwork::new(3).unwrap().into_iter().enumerate() {
            let (secret, _) = keypair(i);
            let session =
                VoterSession::with_transport(config.clone(), secret.clone(), transport).unwrap();
            sessions.push(session);
        }

        assert_eq!(sessions[0].index(), 0);
        assert_eq!(sessions[0].previous(), 2);
        assert_eq!(sessions[0].next(), 1);
        assert_eq!(sessions[2].next(), 0);
        assert!(sessions[2].is_tail());
        assert!(!sessions[1].is_tail());
        assert_eq!(sessions[1].participants(), 3);
    }

    #[test]
    fn test_result_counts() {
        let result = VotingResult {
            voter_index: 0,
            votes: vec![vec![10], vec![20], vec![10]],
        };
        assert_eq!(result.count(&[10]), 2);
        assert!(result.contains(&[20]));
        assert!(!result.contains(&[30]));
    }
}
