//! Addressed message passing between the voters of a chain.
//!
//! [`ChainTransport`] is the raw medium: it moves a batch to a target voter and hands
//! back whatever arrives together with the sender's chain index. [`Mailbox`] sits on
//! top of it for one voter. It keeps self-addressed batches in a local loopback slot
//! instead of sending them through the medium, and parks batches that arrive before
//! they are wanted, keyed by sender, so a round can ask for one specific sender.

use crate::{BallotBatch, Error, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

/// A sender delivers at most this many batches to any one voter during a run
const MAX_PENDING_PER_SENDER: usize = 3;

/// A batch in flight.
///
/// On the way out `participant` is the target; once delivered it is the sender.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope {
    pub ballots: BallotBatch,
    pub participant: usize,
}

impl Envelope {
    pub fn to_cbor(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_cbor::from_slice(bytes)?)
    }
}

/// The medium connecting all voters of a chain
pub trait ChainTransport {
    /// Hand a batch over for delivery to the voter at `target`
    fn send(&mut self, batch: BallotBatch, target: usize) -> Result<(), Error>;

    /// Block until a batch addressed to us arrives, returning it with its sender's index
    fn receive(&mut self) -> Result<(BallotBatch, usize), Error>;
}

/// Channel handles for one voter.
///
/// Outbound envelopes carry the target index; inbound envelopes carry the sender index,
/// stamped by whatever routes between voters.
pub struct ChannelTransport {
    outbound: SyncSender<Envelope>,
    inbound: Receiver<Envelope>,
    receive_timeout: Option<Duration>,
}

impl ChannelTransport {
    pub fn new(outbound: SyncSender<Envelope>, inbound: Receiver<Envelope>) -> Self {
        ChannelTransport {
            outbound,
            inbound,
            receive_timeout: None,
        }
    }

    /// Give up on a receive after waiting this long
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }
}

impl ChainTransport for ChannelTransport {
    fn send(&mut self, batch: BallotBatch, target: usize) -> Result<(), Error> {
        self.outbound
            .send(Envelope {
                ballots: batch,
                participant: target,
            })
            .map_err(|_| TransportError::Disconnected)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<(BallotBatch, usize), Error> {
        let envelope = match self.receive_timeout {
            Some(timeout) => self.inbound.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => TransportError::Timeout(timeout),
                RecvTimeoutError::Disconnected => TransportError::Disconnected,
            })?,
            None => self
                .inbound
                .recv()
                .map_err(|_| TransportError::Disconnected)?,
        };
        Ok((envelope.ballots, envelope.participant))
    }
}

/// One voter's view of the transport
pub struct Mailbox<T> {
    transport: T,
    index: usize,
    participants: usize,
    loopback: Option<BallotBatch>,
    pending: HashMap<usize, VecDeque<BallotBatch>>,
}

impl<T: ChainTransport> Mailbox<T> {
    pub fn new(transport: T, index: usize, participants: usize) -> Self {
        Mailbox {
            transport,
            index,
            participants,
            loopback: None,
            pending: HashMap::new(),
        }
    }

    pub fn send(&mut self, batch: BallotBatch, target: usize) -> Result<(), Error> {
        if target >= self.participants {
            return Err(TransportError::UnknownParticipant(target).into());
        }

        debug!(
            "voter {}: sending {} ballot(s) to voter {}",
            self.index,
            batch.len(),
            target
        );

        if target == self.index {
            if self.loopback.is_some() {
                return Err(TransportError::LoopbackOccupied.into());
            }
            self.loopback = Some(batch);
            return Ok(());
        }

        self.transport.send(batch, target)
    }

    /// Block until a batch from `sender` is available.
    ///
    /// Batches from other senders that arrive meanwhile are kept for later rounds.
    pub fn receive_from(&mut self, sender: usize) -> Result<BallotBatch, Error> {
        if sender >= self.participants {
            return Err(TransportError::UnknownParticipant(sender).into());
        }

        if sender == self.index {
            if let Some(batch) = self.loopback.take() {
                self.log_received(&batch, sender, "loopback");
                return Ok(batch);
            }
        }

        if let Some(batch) = self
            .pending
            .get_mut(&sender)
            .and_then(|queue| queue.pop_front())
        {
            self.log_received(&batch, sender, "pending queue");
            return Ok(batch);
        }

        loop {
            let (batch, from) = self.transport.receive()?;
            if from == sender {
                self.log_received(&batch, from, "transport");
                return Ok(batch);
            }
            self.park(batch, from);
        }
    }

    fn log_received(&self, batch: &BallotBatch, from: usize, via: &str) {
        debug!(
            "voter {}: received {} ballot(s) from voter {} via {}",
            self.index,
            batch.len(),
            from,
            via
        );
    }

    fn park(&mut self, batch: BallotBatch, from: usize) {
        if from >= self.participants {
            warn!(
                "voter {}: dropping batch from unknown voter {}",
                self.index, from
            );
            return;
        }

        let queue = self.pending.entry(from).or_default();
        if queue.len() >= MAX_PENDING_PER_SENDER {
            warn!(
                "voter {}: dropping surplus batch from voter {}",
                self.index, from
            );
            return;
        }
        queue.push_back(batch);
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// In-process wiring of a whole chain.
///
/// Every voter gets a rendezvous channel pair. A router thread per voter takes its
/// outbound envelopes, stamps the voter's index on them and hands them to the target's
/// inbound channel.
pub struct LocalNetwork;

impl LocalNetwork {
    pub fn new(participants: usize) -> Result<Vec<ChannelTransport>, Error> {
        Self::build(participants, None)
    }

    pub fn with_receive_timeout(
        participants: usize,
        timeout: Duration,
    ) -> Result<Vec<ChannelTransport>, Error> {
        Self::build(participants, Some(timeout))
    }

    fn build(
        participants: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<ChannelTransport>, Error> {
        let (inbox_senders, inbox_receivers): (Vec<_>, Vec<_>) =
            (0..participants).map(|_| sync_channel(0)).unzip();

        let mut transports = Vec::with_capacity(participants);
        for (sender, inbound) in inbox_receivers.into_iter().enumerate() {
            let (outbound, routed) = sync_channel::<Envelope>(0);
            let inboxes = inbox_senders.clone();

            thread::Builder::new()
                .name(format!("onionvote-router-{}", sender))
                .spawn(move || {
                    for envelope in routed.iter() {
                        let target = envelope.participant;
                        let delivery = Envelope {
                            ballots: envelope.ballots,
                            participant: sender,
                        };
                        match inboxes.get(target) {
                            Some(inbox) => {
                                if inbox.send(delivery).is_err() {
                                    warn!(
                                        "router {}: voter {} is gone, dropping batch",
                                        sender, target
                                    );
                                }
                            }
                            None => warn!(
                                "router {}: no voter {}, dropping batch",
                                sender, target
                            ),
                        }
                    }
                })?;

            let transport = ChannelTransport::new(outbound, inbound);
            transports.push(match timeout {
                Some(timeout) => transport.with_receive_timeout(timeout),
                None => transport,
            });
        }

        Ok(transports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazy_static::lazy_static;
    use std::sync::Mutex;

    // Scripted medium for driving a mailbox without threads
    #[derive(Default)]
    struct Scripted {
        incoming: VecDeque<(BallotBatch, usize)>,
        sent: Vec<(BallotBatch, usize)>,
    }

    impl ChainTransport for Scripted {
        fn send(&mut self, batch: BallotBatch, target: usize) -> Result<(), Error> {
            self.sent.push((batch, target));
            Ok(())
        }

        fn receive(&mut self) -> Result<(BallotBatch, usize), Error> {
            self.incoming
                .pop_front()
                .ok_or_else(|| TransportError::Disconnected.into())
        }
    }

    #[test]
    fn test_loopback_never_touches_transport() {
        let mut mailbox = Mailbox::new(Scripted::default(), 1, 3);

        mailbox.send(vec![vec![1]], 1).unwrap();
        match mailbox.send(vec![vec![2]], 1) {
            Err(Error::Transport(TransportError::LoopbackOccupied)) => {}
            other => panic!("expected occupied loopback, got {:?}", other),
        }

        assert_eq!(mailbox.receive_from(1).unwrap(), vec![vec![1]]);
        assert!(mailbox.into_inner().sent.is_empty());
    }

    #[test]
    fn test_receive_filters_by_sender() {
        let mut scripted = Scripted::default();
        scripted.incoming.push_back((vec![vec![2]], 2));
        scripted.incoming.push_back((vec![vec![0]], 0));
        scripted.incoming.push_back((vec![vec![2, 2]], 2));
        let mut mailbox = Mailbox::new(scripted, 1, 3);

        assert_eq!(mailbox.receive_from(0).unwrap(), vec![vec![0]]);
        // Parked batches come back in arrival order
        assert_eq!(mailbox.receive_from(2).unwrap(), vec![vec![2]]);
        assert_eq!(mailbox.receive_from(2).unwrap(), vec![vec![2, 2]]);
        assert!(mailbox.receive_from(2).is_err());
    }

    #[test]
    fn test_unknown_participants() {
        let mut scripted = Scripted::default();
        scripted.incoming.push_back((vec![vec![9]], 9));
        scripted.incoming.push_back((vec![vec![0]], 0));
        let mut mailbox = Mailbox::new(scripted, 1, 2);

        match mailbox.send(vec![], 2) {
            Err(Error::Transport(TransportError::UnknownParticipant(2))) => {}
            other => panic!("expected unknown participant, got {:?}", other),
        }
        assert!(mailbox.receive_from(5).is_err());

        // The stray batch from voter 9 is dropped
        assert_eq!(mailbox.receive_from(0).unwrap(), vec![vec![0]]);
        assert!(mailbox.pending.is_empty());

        mailbox.send(vec![vec![7]], 0).unwrap();
        assert_eq!(mailbox.into_inner().sent, vec![(vec![vec![7]], 0)]);
    }

    #[test]
    fn test_surplus_batches_are_bounded() {
        let mut scripted = Scripted::default();
        for i in 0..5 {
            scripted.incoming.push_back((vec![vec![i]], 2));
        }
        scripted.incoming.push_back((vec![], 0));
        let mut mailbox = Mailbox::new(scripted, 1, 3);

        mailbox.receive_from(0).unwrap();
        assert_eq!(mailbox.pending[&2].len(), MAX_PENDING_PER_SENDER);
    }

    struct Capture(Mutex<Vec<String>>);

    impl log::Log for Capture {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    lazy_static! {
        static ref CAPTURE: Capture = Capture(Mutex::new(Vec::new()));
    }

    fn captured(needle: &str) -> bool {
        CAPTURE.0.lock().unwrap().iter().any(|line| line.contains(needle))
    }

    #[test]
    fn test_every_receive_path_is_logged() {
        // Another test may have installed the logger already
        let _ = log::set_logger(&*CAPTURE);
        log::set_max_level(log::LevelFilter::Debug);

        let mut scripted = Scripted::default();
        scripted.incoming.push_back((vec![vec![8]], 8));
        scripted.incoming.push_back((vec![vec![6]], 6));
        let mut mailbox = Mailbox::new(scripted, 7, 9);

        mailbox.send(vec![vec![7]], 7).unwrap();
        mailbox.receive_from(7).unwrap();
        mailbox.receive_from(6).unwrap();
        mailbox.receive_from(8).unwrap();

        assert!(captured("voter 7: received 1 ballot(s) from voter 7 via loopback"));
        assert!(captured("voter 7: received 1 ballot(s) from voter 6 via transport"));
        assert!(captured("voter 7: received 1 ballot(s) from voter 8 via pending queue"));
    }

    #[test]
    fn test_local_network_stamps_sender() {
        let mut transports =
            LocalNetwork::with_receive_timeout(3, Duration::from_secs(10)).unwrap();
        let mut third = transports.pop().unwrap();
        let mut second = transports.pop().unwrap();

        let handle = thread::spawn(move || second.send(vec![vec![4, 2]], 2));

        let (batch, sender) = third.receive().unwrap();
        assert_eq!(batch, vec![vec![4, 2]]);
        assert_eq!(sender, 1);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_receive_timeout() {
        let mut transports =
            LocalNetwork::with_receive_timeout(2, Duration::from_millis(50)).unwrap();

        match transports[0].receive() {
            Err(Error::Transport(TransportError::Timeout(_))) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_envelope_cbor() {
        let envelope = Envelope {
            ballots: vec![vec![1, 2, 3], vec![], vec![255; 40]],
            participant: 4,
        };

        let bytes = envelope.to_cbor().unwrap();
        assert_eq!(Envelope::from_cbor(&bytes).unwrap(), envelope);
        assert!(Envelope::from_cbor(&bytes[..bytes.len() - 1]).is_err());
    }
}
