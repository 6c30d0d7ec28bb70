use onionvote::{generate_keypair, save_private_key, Voter, VotingConfig};
use std::path::Path;

pub fn command_keygen(matches: &clap::ArgMatches) {
    let dir = crate::expand(matches.value_of("DIR").unwrap_or("."));
    let dir = Path::new(&dir);

    let voters: usize = matches
        .value_of("voters")
        .unwrap_or("3")
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("onionvote keygen: --voters must be a positive number");
            std::process::exit(1);
        });
    if voters == 0 {
        eprintln!("onionvote keygen: a chain needs at least one voter");
        std::process::exit(1);
    }
    let bits = crate::key_bits(matches);

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("onionvote keygen: unable to create {}: {}", dir.display(), e);
        std::process::exit(1);
    }

    let mut roster = Vec::with_capacity(voters);
    for i in 0..voters {
        let (secret, public) = generate_keypair(bits).unwrap_or_else(|e| {
            eprintln!("onionvote keygen: {}", e);
            std::process::exit(1);
        });

        let path = dir.join(crate::key_file(i));
        if let Err(e) = save_private_key(&path, &secret) {
            eprintln!("onionvote keygen: unable to write {}: {}", path.display(), e);
            std::process::exit(1);
        }
        log::info!("wrote {}", path.display());

        roster.push(Voter::new(public));
    }

    let mut config = VotingConfig::new(roster);
    if let Some(question) = matches.value_of("question") {
        config.question = question.to_string();
    }
    if let Some(answers) = matches.values_of("answer") {
        config.answers = answers.map(String::from).collect();
    }

    let path = dir.join(crate::ROSTER_FILE);
    if let Err(e) = config.save(&path) {
        eprintln!("onionvote keygen: unable to write {}: {}", path.display(), e);
        std::process::exit(1);
    }

    println!("roster: {}", path.display());
    println!("voters: {}", voters);
}
