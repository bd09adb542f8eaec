use super::*;

use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

fn orchestrator(config: ElectionConfig, dir: &std::path::Path) -> Orchestrator {
    let mut paths = ArtifactPaths::default();
    paths.dir = dir.to_path_buf();
    Orchestrator::new(config, ArtifactStore::new(paths))
}

#[test]
fn end_to_end_election() {
    let dir = tempfile::tempdir().unwrap();
    let config = ElectionConfig::new(1, 8, 3).unwrap();
    let orchestrator = orchestrator(config, dir.path());
    let mut rng = ChaCha20Rng::seed_from_u64(42);

    // Voters generate their keypairs, each under its own index
    for index in 0..config.participants() {
        let (_, skipped) = orchestrator.init_voter(index, &mut rng).unwrap();
        assert!(skipped.is_empty());
    }

    // Re-running a voter's init is a harmless no-op under no-clobber
    let (_, skipped) = orchestrator.init_voter(0, &mut rng).unwrap();
    assert_eq!(skipped.len(), 2);

    // The admin initializes the election over the full census
    let (artifacts, _) = orchestrator.init_admin(&mut rng).unwrap();
    assert_eq!(artifacts.eid.len(), config.eid_bits);

    // Voters cast their ballots
    let choices = [2usize, 0];
    for (index, &choice) in choices.iter().enumerate() {
        let (vote, _) = orchestrator.vote(index, Some(choice), &mut rng).unwrap();
        assert_eq!(vote.eid, artifacts.eid);
        assert_eq!(vote.root, artifacts.root);
    }

    // Any observer can verify the published votes
    orchestrator.vote_verify().unwrap();

    // A replayed artifact shares its serial number and is rejected
    let replayed = vec![
        orchestrator.store.read_vote(&config, 0).unwrap(),
        orchestrator.store.read_vote(&config, 0).unwrap(),
    ];
    let verifying = orchestrator.store.read_verifying_key().unwrap();
    let session_public = orchestrator.store.read_session_public_key().unwrap();
    match verify_cast_votes(
        &config,
        &replayed,
        &verifying,
        &session_public,
        &artifacts.eid,
        &artifacts.root,
    ) {
        Err(Error::Verification(VerificationError::DuplicateSerialNumber(0, 1))) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    // The tally authority aggregates, decrypts and proves
    let (tally, _) = orchestrator.tally_admin(&mut rng).unwrap();
    assert_eq!(tally.counts, vec![1, 0, 1]);

    // Any voter can audit the published result
    assert_eq!(orchestrator.tally_voter().unwrap(), vec![1, 0, 1]);

    // A single mutated coordinate must fail the audit
    let (mut counts, proof) = orchestrator.store.read_tally().unwrap();
    counts[1] += 1;
    let ciphertexts = orchestrator
        .store
        .read_ciphertexts(config.participants())
        .unwrap();
    let session_verification = orchestrator
        .store
        .read_session_verification_key()
        .unwrap();
    assert!(verify_tally(
        &config,
        &ciphertexts,
        &session_verification,
        &verifying,
        &counts,
        &proof,
    )
    .is_err());
}

// The reference scenario from the deployment notes: 4 participants, 64-bit
// session id, 7 options. Slow under Groth16 in debug builds, so opt-in.
#[test]
#[ignore]
fn reference_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let config = ElectionConfig::new(2, 64, 7).unwrap();
    let orchestrator = orchestrator(config, dir.path());
    let mut rng = ChaCha20Rng::seed_from_u64(7);

    let counts = orchestrator.run_demo(&mut rng).unwrap();
    assert_eq!(counts.len(), 7);
    assert_eq!(counts.iter().sum::<u64>(), 4);
}
