use clap::{App, AppSettings, Arg, SubCommand};
use log::LevelFilter;

mod command_keygen;
mod command_roster;
mod command_simulate;

use command_keygen::command_keygen;
use command_roster::command_roster;
use command_simulate::command_simulate;

pub const ROSTER_FILE: &str = "roster.json";

fn main() {
    let matches = App::new("OnionVote CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Runs anonymous onion-mixed votes over a chain of voters")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate voter keys and a roster")
                .arg(
                    Arg::with_name("DIR")
                        .index(1)
                        .required(true)
                        .help("Directory for the private keys and roster.json"),
                )
                .arg(
                    Arg::with_name("voters")
                        .long("voters")
                        .short("n")
                        .takes_value(true)
                        .default_value("3")
                        .help("Number of voters in the chain"),
                )
                .arg(
                    Arg::with_name("bits")
                        .long("bits")
                        .takes_value(true)
                        .help("RSA modulus size, defaults to 2048"),
                )
                .arg(
                    Arg::with_name("question")
                        .long("question")
                        .takes_value(true)
                        .help("The question being voted on"),
                )
                .arg(
                    Arg::with_name("answer")
                        .long("answer")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .help("A possible answer, can be repeated"),
                ),
        )
        .subcommand(
            SubCommand::with_name("roster")
                .about("Print a roster summary")
                .arg(
                    Arg::with_name("ROSTER")
                        .index(1)
                        .required(false)
                        .help("Roster file - can also be set with ONIONVOTE_CONFIG"),
                ),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run every voter of a chain in this process and tally the result")
                .arg(
                    Arg::with_name("roster")
                        .long("roster")
                        .takes_value(true)
                        .help(
                            "Roster file - can also be set with ONIONVOTE_CONFIG. \
                             Without one, fresh keys are generated",
                        ),
                )
                .arg(
                    Arg::with_name("keys")
                        .long("keys")
                        .takes_value(true)
                        .help("Directory holding voter-N.pem, defaults to the roster's directory"),
                )
                .arg(
                    Arg::with_name("bits")
                        .long("bits")
                        .takes_value(true)
                        .help("RSA modulus size for fresh keys, defaults to 2048"),
                )
                .arg(
                    Arg::with_name("VOTE")
                        .index(1)
                        .required(true)
                        .multiple(true)
                        .help("One unsigned integer vote per voter, in chain order"),
                ),
        )
        .get_matches();

    // -v is global, so it may have been given after the subcommand
    let verbosity = matches.occurrences_of("v").max(
        matches
            .subcommand()
            .1
            .map(|m| m.occurrences_of("v"))
            .unwrap_or(0),
    );
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();

    // Roster path from the command line, falling back to ONIONVOTE_CONFIG
    let env_var = std::env::var("ONIONVOTE_CONFIG").ok();

    // Subcommands
    if let Some(matches) = matches.subcommand_matches("keygen") {
        command_keygen(matches);
    }
    if let Some(matches) = matches.subcommand_matches("roster") {
        let roster = roster_path(matches.value_of("ROSTER"), env_var.as_deref());
        command_roster(&roster);
    }
    if let Some(matches) = matches.subcommand_matches("simulate") {
        let roster = matches
            .value_of("roster")
            .or_else(|| env_var.as_deref())
            .map(expand);
        command_simulate(matches, roster.as_deref());
    }
}

fn roster_path(arg: Option<&str>, env_var: Option<&str>) -> String {
    match arg.or(env_var) {
        Some(path) => expand(path),
        None => {
            eprintln!(
                "onionvote: provide a roster file either as an argument or via ONIONVOTE_CONFIG"
            );
            std::process::exit(1);
        }
    }
}

/// Expand `~` and environment variables in a path given on the command line
pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => {
            eprintln!("onionvote: unable to expand {}: {}", input, e);
            std::process::exit(1);
        }
    }
}

pub fn key_file(index: usize) -> String {
    format!("voter-{}.pem", index)
}

/// Parse an optional `--bits` value
pub fn key_bits(matches: &clap::ArgMatches) -> usize {
    match matches.value_of("bits") {
        None => onionvote::DEFAULT_KEY_BITS,
        Some(bits) => bits.parse().unwrap_or_else(|_| {
            eprintln!("onionvote: invalid key size {}", bits);
            std::process::exit(1);
        }),
    }
}
