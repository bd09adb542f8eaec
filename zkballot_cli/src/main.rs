use clap::{App, Arg, ArgMatches, SubCommand};
use rand::rngs::OsRng;
use std::path::PathBuf;
use std::process::exit;
use zkballot::*;

fn main() {
    let matches = App::new("zkballot")
        .version("0.1.0")
        .about("Anonymous, verifiable voting over encrypted one-hot ballots")
        .arg(
            Arg::with_name("tree-depth")
                .long("tree-depth")
                .takes_value(true)
                .default_value("2")
                .help("Depth of the Merkle tree built upon participants' public keys"),
        )
        .arg(
            Arg::with_name("eid-bits")
                .long("eid-bits")
                .takes_value(true)
                .default_value("64")
                .help("Session id length in bits"),
        )
        .arg(
            Arg::with_name("options")
                .long("options")
                .takes_value(true)
                .default_value("7")
                .help("Number of ballot options"),
        )
        .arg(
            Arg::with_name("dir")
                .long("dir")
                .takes_value(true)
                .default_value(".")
                .help("Directory holding all artifact files"),
        )
        .arg(path_arg("voter-public-key-output", "voter_public_key", "Voter public key output path"))
        .arg(path_arg("voter-secret-key-output", "voter_secret_key", "Voter secret key output path"))
        .arg(path_arg("r1cs-proof-output", "r1cs_proof", "Proof output path"))
        .arg(path_arg("r1cs-primary-input-output", "r1cs_primary_input", "Primary input output path"))
        .arg(path_arg("r1cs-proving-key-output", "r1cs_proving_key", "Proving key output path"))
        .arg(path_arg("r1cs-verification-key-output", "r1cs_verification_key", "Verification key output path"))
        .arg(path_arg("r1cs-verifier-input-output", "r1cs_verification_input", "Verifier input output path"))
        .arg(path_arg("public-key-output", "pk_eid", "Encryption public key output path"))
        .arg(path_arg("verification-key-output", "vk_eid", "Encryption verification key output path"))
        .arg(path_arg("secret-key-output", "sk_eid", "Encryption secret key output path"))
        .arg(path_arg("cipher-text-output", "cipher_text", "Cipher text output path"))
        .arg(path_arg("decryption-proof-output", "decryption_proof", "Decryption proof output path"))
        .arg(path_arg("voting-result-output", "voting_result", "Voting result output path"))
        .arg(path_arg("eid-output", "eid", "Session id output path"))
        .arg(path_arg("sn-output", "sn", "Serial number output path"))
        .arg(path_arg("rt-output", "rt", "Census root output path"))
        .subcommand(
            SubCommand::with_name("init_voter")
                .about("Generate and write a voter's public and secret keys")
                .arg(voter_idx_arg()),
        )
        .subcommand(
            SubCommand::with_name("init_admin")
                .about("Build the census tree, generate the CRS and encryption keys, sample the session id"),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Encrypt a ballot, generate its proofs and write them")
                .arg(voter_idx_arg())
                .arg(
                    Arg::with_name("choice")
                        .long("choice")
                        .takes_value(true)
                        .help("Ballot option to vote for; random when omitted"),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote_verify")
                .about("Read all published votes and verify their proofs"),
        )
        .subcommand(
            SubCommand::with_name("tally_admin")
                .about("Aggregate ciphertexts, decrypt the aggregate and write the decryption proof"),
        )
        .subcommand(
            SubCommand::with_name("tally_voter")
                .about("Re-aggregate ciphertexts and verify the published tally"),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Run every protocol phase in order in one process"),
        )
        .get_matches();

    let tree_depth = parse_usize(&matches, "tree-depth");
    let eid_bits = parse_usize(&matches, "eid-bits");
    let options = parse_usize(&matches, "options");
    let config = ElectionConfig::new(tree_depth, eid_bits, options).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(2);
    });
    let orchestrator = Orchestrator::new(config, ArtifactStore::new(artifact_paths(&matches)));

    let (name, sub) = matches.subcommand();
    if name.is_empty() || name == "demo" {
        // no phase selected: run the whole protocol in this process
        command_demo(&orchestrator);
        return;
    }
    let phase: Phase = name.parse().unwrap_or_else(|e: Error| {
        eprintln!("{}", e);
        exit(2);
    });
    match phase {
        Phase::InitVoter => {
            let sub = sub.expect("clap provides matches for a named subcommand");
            command_init_voter(&orchestrator, parse_usize(sub, "voter-idx"));
        }
        Phase::InitAdmin => command_init_admin(&orchestrator),
        Phase::Vote => {
            let sub = sub.expect("clap provides matches for a named subcommand");
            let choice = sub.value_of("choice").map(|raw| {
                raw.parse().unwrap_or_else(|_| {
                    eprintln!("zkballot: invalid value for --choice");
                    exit(2);
                })
            });
            command_vote(&orchestrator, parse_usize(sub, "voter-idx"), choice);
        }
        Phase::VoteVerify => command_vote_verify(&orchestrator),
        Phase::TallyAdmin => command_tally_admin(&orchestrator),
        Phase::TallyVoter => command_tally_voter(&orchestrator),
    }
}

fn path_arg(name: &'static str, default: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .default_value(default)
        .help(help)
}

fn voter_idx_arg() -> Arg<'static, 'static> {
    Arg::with_name("voter-idx")
        .long("voter-idx")
        .takes_value(true)
        .default_value("0")
        .help("Voter index")
}

fn parse_usize(matches: &ArgMatches, name: &str) -> usize {
    let raw = matches.value_of(name).unwrap_or_default();
    raw.parse().unwrap_or_else(|_| {
        eprintln!("zkballot: invalid value for --{}", name);
        exit(2);
    })
}

fn artifact_paths(matches: &ArgMatches) -> ArtifactPaths {
    let prefix = |name: &str| matches.value_of(name).unwrap_or_default().to_string();
    ArtifactPaths {
        dir: PathBuf::from(matches.value_of("dir").unwrap_or(".")),
        voter_public_key: prefix("voter-public-key-output"),
        voter_secret_key: prefix("voter-secret-key-output"),
        proof: prefix("r1cs-proof-output"),
        primary_input: prefix("r1cs-primary-input-output"),
        proving_key: prefix("r1cs-proving-key-output"),
        verification_key: prefix("r1cs-verification-key-output"),
        verifier_input: prefix("r1cs-verifier-input-output"),
        session_public_key: prefix("public-key-output"),
        session_secret_key: prefix("secret-key-output"),
        session_verification_key: prefix("verification-key-output"),
        ciphertext: prefix("cipher-text-output"),
        decryption_proof: prefix("decryption-proof-output"),
        voting_result: prefix("voting-result-output"),
        eid: prefix("eid-output"),
        serial_number: prefix("sn-output"),
        root: prefix("rt-output"),
    }
}

fn fatal(phase: &str, err: Error) -> ! {
    eprintln!("zkballot {}: {}", phase, err);
    exit(1);
}

fn report_skipped(skipped: &[PathBuf]) {
    for path in skipped {
        println!("File {} exists and won't be overwritten.", path.display());
    }
}

fn bit_string(bits: &[bool]) -> String {
    bits.iter().map(|bit| if *bit { '1' } else { '0' }).collect()
}

fn command_init_voter(orchestrator: &Orchestrator, index: usize) {
    println!("Voter {} generates its public and secret keys...", index);
    let (public, skipped) = orchestrator
        .init_voter(index, &mut OsRng)
        .unwrap_or_else(|e| fatal("init_voter", e));
    println!("Public key of the Voter {}: {}", index, public);
    report_skipped(&skipped);
    println!("Voter {} keypair generated and marshalled.", index);
}

fn command_init_admin(orchestrator: &Orchestrator) {
    println!(
        "There will be {} participants in voting.",
        orchestrator.config.participants()
    );
    println!("Administrator initializes the voting session...");
    let (artifacts, skipped) = orchestrator
        .init_admin(&mut OsRng)
        .unwrap_or_else(|e| fatal("init_admin", e));
    println!("Voting session (eid) is: {}", bit_string(&artifacts.eid));
    report_skipped(&skipped);
    println!("CRS and encryption keys generated, admin artifacts marshalled.");
}

fn command_vote(orchestrator: &Orchestrator, index: usize, choice: Option<usize>) {
    println!("Voter {} generates its encrypted ballot...", index);
    let (vote, skipped) = orchestrator
        .vote(index, choice, &mut OsRng)
        .unwrap_or_else(|e| fatal("vote", e));
    let serial = ScalarVector::single(vote.serial_number)
        .to_bytes()
        .unwrap_or_else(|e| fatal("vote", e));
    println!(
        "Serial number (sn) in current session: {}",
        hex::encode(&serial[4..])
    );
    report_skipped(&skipped);
    println!("Vote of voter {} proven, rerandomized, self-verified and marshalled.", index);
}

fn command_vote_verify(orchestrator: &Orchestrator) {
    println!("Verification of all published votes started...");
    orchestrator
        .vote_verify()
        .unwrap_or_else(|e| fatal("vote_verify", e));
    println!("All published votes verified.");
}

fn command_tally_admin(orchestrator: &Orchestrator) {
    println!("Administrator aggregates encrypted ballots, decrypts the aggregate and proves the decryption...");
    let (tally, skipped) = orchestrator
        .tally_admin(&mut OsRng)
        .unwrap_or_else(|e| fatal("tally_admin", e));
    println!("Deciphered results of voting:");
    println!(
        "{}",
        tally
            .counts
            .iter()
            .map(|count| count.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    report_skipped(&skipped);
    println!("Tally phase artifacts marshalled.");
}

fn command_tally_voter(orchestrator: &Orchestrator) {
    println!("Voter re-aggregates encrypted ballots and verifies the published result...");
    let counts = orchestrator
        .tally_voter()
        .unwrap_or_else(|e| fatal("tally_voter", e));
    println!("Decryption proof verification succeeded.");
    println!("Results of voting:");
    println!(
        "{}",
        counts
            .iter()
            .map(|count| count.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn command_demo(orchestrator: &Orchestrator) {
    for index in 0..orchestrator.config.participants() {
        command_init_voter(orchestrator, index);
    }
    command_init_admin(orchestrator);
    for index in 0..orchestrator.config.participants() {
        command_vote(orchestrator, index, None);
    }
    command_vote_verify(orchestrator);
    command_tally_admin(orchestrator);
    command_tally_voter(orchestrator);
}
