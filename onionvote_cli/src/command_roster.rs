use onionvote::VotingConfig;
use rsa::traits::PublicKeyParts;

pub fn command_roster(path: &str) {
    let config = VotingConfig::load(path).unwrap_or_else(|e| {
        eprintln!("onionvote roster: unable to read {}: {}", path, e);
        std::process::exit(1);
    });

    if !config.question.is_empty() {
        println!("Question: {}", config.question);
    }
    if !config.answers.is_empty() {
        println!("Answers:");
        for answer in config.answers.iter() {
            println!("  {}", answer);
        }
    }

    println!("Voters ({}):", config.len());
    for (i, voter) in config.voters.iter().enumerate() {
        let modulus = voter.public_key.n().to_bytes_be();
        let fingerprint = hex::encode(&modulus[modulus.len().saturating_sub(8)..]);
        let role = match i {
            0 => " (head)",
            i if i + 1 == config.len() => " (tail)",
            _ => "",
        };

        print!(
            "  {}: {} bits ...{}{}",
            i,
            voter.public_key.size() * 8,
            fingerprint,
            role
        );
        if !voter.address.is_empty() {
            print!(" at {}", voter.address);
        }
        println!();
    }
}
