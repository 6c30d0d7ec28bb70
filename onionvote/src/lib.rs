//! Anonymous voting over a chain of voters that double as mix nodes.
//!
//! Each voter seals its vote in onion layers for every voter in the chain, then takes
//! part in mixing everyone's ballots: shuffling, peeling a layer and passing the batch on.
//! A voter checks after the first round that its own ballot survived, and a signature
//! relay in the second round catches ballots dropped or swapped in transit.

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

pub mod ballot;
mod config;
mod error;
pub mod hybrid;
mod serde_hex;
mod session;
pub mod shuffle;
pub mod signature;
mod transport;
mod util;

pub use ballot::{Ballot, BallotBatch, TagSet, TAG_LENGTH};
pub use config::*;
pub use error::*;
pub use serde_hex::*;
pub use session::*;
pub use transport::*;
pub use util::*;
