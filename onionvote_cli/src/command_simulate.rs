use onionvote::{
    generate_keypair, load_private_key, Error, LocalNetwork, VoterSession, VotingConfig,
    VotingResult,
};
use rsa::RsaPrivateKey;
use std::path::Path;
use std::sync::Arc;
use std::thread;

pub fn command_simulate(matches: &clap::ArgMatches, roster: Option<&str>) {
    let votes: Vec<u64> = matches
        .values_of("VOTE")
        .map(|values| {
            values
                .map(|v| {
                    v.parse().unwrap_or_else(|_| {
                        eprintln!("onionvote simulate: {} is not an unsigned integer", v);
                        std::process::exit(1);
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let (config, secrets) = match roster {
        Some(roster) => load_chain(roster, matches.value_of("keys")),
        None => fresh_chain(votes.len(), crate::key_bits(matches)),
    };

    if votes.len() != config.len() {
        eprintln!(
            "onionvote simulate: {} votes given for {} voters",
            votes.len(),
            config.len()
        );
        std::process::exit(1);
    }

    let results = run_chain(Arc::new(config), secrets, &votes).unwrap_or_else(|e| {
        eprintln!("onionvote simulate: {}", e);
        std::process::exit(1);
    });

    let mut failed = false;
    let mut tallies = Vec::new();
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(result) => {
                let tally = tally(&result).unwrap_or_else(|| {
                    eprintln!("onionvote simulate: voter {}: tally overflows", i);
                    std::process::exit(1);
                });
                println!(
                    "voter {}: {} votes verified, tally {}",
                    result.voter_index,
                    result.votes.len(),
                    tally
                );
                for vote in result.votes.iter() {
                    log::info!("voter {}: vote {}", i, hex::encode(vote));
                }
                tallies.push(tally);
            }
            Err(e) => {
                println!("voter {}: failed: {}", i, e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    if tallies.windows(2).any(|pair| pair[0] != pair[1]) {
        eprintln!("onionvote simulate: voters disagree on the tally");
        std::process::exit(1);
    }
    if let Some(total) = tallies.first() {
        println!("Tally: {}", total);
    }
}

fn load_chain(roster: &str, keys: Option<&str>) -> (VotingConfig, Vec<RsaPrivateKey>) {
    let config = VotingConfig::load(roster).unwrap_or_else(|e| {
        eprintln!("onionvote simulate: unable to read {}: {}", roster, e);
        std::process::exit(1);
    });

    let dir = match keys {
        Some(keys) => crate::expand(keys),
        None => Path::new(roster)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let secrets = (0..config.len())
        .map(|i| {
            let path = Path::new(&dir).join(crate::key_file(i));
            load_private_key(&path).unwrap_or_else(|e| {
                eprintln!("onionvote simulate: unable to read {}: {}", path.display(), e);
                std::process::exit(1);
            })
        })
        .collect();

    (config, secrets)
}

fn fresh_chain(voters: usize, bits: usize) -> (VotingConfig, Vec<RsaPrivateKey>) {
    log::info!("generating {} keys of {} bits", voters, bits);

    let (secrets, publics): (Vec<_>, Vec<_>) = (0..voters)
        .map(|_| {
            generate_keypair(bits).unwrap_or_else(|e| {
                eprintln!("onionvote simulate: {}", e);
                std::process::exit(1);
            })
        })
        .unzip();

    (VotingConfig::from_public_keys(publics), secrets)
}

// Every voter runs in its own thread over the in-process network
fn run_chain(
    config: Arc<VotingConfig>,
    secrets: Vec<RsaPrivateKey>,
    votes: &[u64],
) -> Result<Vec<Result<VotingResult, Error>>, Error> {
    let transports = LocalNetwork::new(config.len())?;

    let mut handles = Vec::with_capacity(config.len());
    for ((secret, transport), vote) in secrets.into_iter().zip(transports).zip(votes) {
        let session = VoterSession::with_transport(config.clone(), secret, transport)?;
        let vote = vote.to_le_bytes();
        let handle = thread::Builder::new()
            .name(format!("onionvote-voter-{}", session.index()))
            .spawn(move || session.vote(&vote))?;
        handles.push(handle);
    }

    Ok(handles
        .into_iter()
        .map(|handle| {
            handle.join().unwrap_or_else(|_| {
                eprintln!("onionvote simulate: a voter thread panicked");
                std::process::exit(1);
            })
        })
        .collect())
}

/// Sum the votes, each read as a little-endian unsigned integer.
///
/// Returns `None` if the sum does not fit in 128 bits.
fn tally(result: &VotingResult) -> Option<u128> {
    result.votes.iter().try_fold(0u128, |total, vote| {
        if vote.len() > 16 {
            log::warn!("ignoring a {}-byte vote in the tally", vote.len());
            return Some(total);
        }
        let value = vote
            .iter()
            .rev()
            .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte));
        total.checked_add(value)
    })
}
