//! Groth16 round trips for the membership circuit.

use ark_bn254::{Bn254, Fr};
use ark_groth16::Groth16;
use ark_snark::SNARK;
use ark_std::rand::thread_rng;

use crate::accumulator::Accumulator;
use crate::hasher::{identity_commitment, leaf_commitment, IdentityFields, StatusTag};
use crate::membership::IdentityMembershipCircuit;

const DEPTH: usize = 4;

fn subject(name: &str, nik: &str) -> IdentityFields {
    IdentityFields::new(nik, name, "19851231", format!("{}-secret", name))
}

/// Test full Groth16 proof generation and verification for a registered identity
#[test]
fn test_membership_full_proof() {
    let mut rng = thread_rng();

    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(
        IdentityMembershipCircuit::empty(DEPTH),
        &mut rng,
    )
    .unwrap();

    let alice = subject("alice", "1001");
    let bob = subject("bob", "1002");
    let alice_salt = Fr::from(31337u64);
    let bob_salt = Fr::from(4242u64);

    let leaves = vec![
        leaf_commitment(identity_commitment(&alice).unwrap(), alice_salt, StatusTag::Active),
        leaf_commitment(identity_commitment(&bob).unwrap(), bob_salt, StatusTag::Active),
    ];
    let acc = Accumulator::build(leaves, DEPTH).unwrap();

    let circuit =
        IdentityMembershipCircuit::new(&bob, bob_salt, acc.proof(1).unwrap(), acc.root()).unwrap();
    let public_inputs = circuit.public_inputs().unwrap();

    let proof = Groth16::<Bn254>::prove(&pk, circuit, &mut rng).unwrap();
    let valid = Groth16::<Bn254>::verify(&vk, &public_inputs, &proof).unwrap();
    assert!(valid, "membership proof verification failed");

    // Same proof must not verify against another root
    let other_root = Accumulator::build(vec![Fr::from(1u64)], DEPTH).unwrap().root();
    let forged = vec![other_root, public_inputs[1]];
    assert!(!Groth16::<Bn254>::verify(&vk, &forged, &proof).unwrap());
}

/// A proof for one identity must not verify under another identity commitment
#[test]
fn test_membership_binds_identity() {
    let mut rng = thread_rng();

    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(
        IdentityMembershipCircuit::empty(DEPTH),
        &mut rng,
    )
    .unwrap();

    let alice = subject("alice", "1001");
    let salt = Fr::from(7u64);
    let acc = Accumulator::build(
        vec![leaf_commitment(identity_commitment(&alice).unwrap(), salt, StatusTag::Active)],
        DEPTH,
    )
    .unwrap();

    let circuit =
        IdentityMembershipCircuit::new(&alice, salt, acc.proof(0).unwrap(), acc.root()).unwrap();
    let proof = Groth16::<Bn254>::prove(&pk, circuit, &mut rng).unwrap();

    let mallory = identity_commitment(&subject("mallory", "1003")).unwrap();
    assert!(!Groth16::<Bn254>::verify(&vk, &[acc.root(), mallory], &proof).unwrap());
}
