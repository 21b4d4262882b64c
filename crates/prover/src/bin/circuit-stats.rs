//! Circuit statistics utility - reports constraint counts and proof timing
//!
//! Usage:
//!   cargo run --release --bin circuit-stats           # Just constraint counts
//!   cargo run --release --bin circuit-stats -- --time # Include proof timing (runs setup)

use std::time::Instant;

use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_std::rand::{rngs::StdRng, SeedableRng};

use identity_circuits::{
    identity_commitment, leaf_commitment, Accumulator, IdentityFields, IdentityMembershipCircuit,
    StatusTag, DEFAULT_DEPTH,
};
use identity_prover::{prove_membership, setup_membership, verify_membership};

fn count_constraints<C: ConstraintSynthesizer<Fr>>(circuit: C, name: &str) -> usize {
    let cs = ConstraintSystem::<Fr>::new_ref();
    if let Err(e) = circuit.generate_constraints(cs.clone()) {
        println!("{:25} synthesis failed: {}", name, e);
        return 0;
    }
    let count = cs.num_constraints();
    println!("{:25} {:>8} constraints", name, count);
    count
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let include_timing = args.iter().any(|a| a == "--time");

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║            IDENTITY MEMBERSHIP CIRCUIT STATS             ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    println!("Tree Depth: {}", DEFAULT_DEPTH);
    println!("Max Identities: {}\n", 1u64 << DEFAULT_DEPTH);

    println!("─────────────────────────────────────────────────────────────");
    println!("CIRCUIT CONSTRAINTS:");
    println!("─────────────────────────────────────────────────────────────\n");

    for depth in [8, 12, DEFAULT_DEPTH, 20] {
        count_constraints(
            IdentityMembershipCircuit::empty(depth),
            &format!("Membership (depth {})", depth),
        );
    }

    if include_timing {
        println!("\n─────────────────────────────────────────────────────────────");
        println!("PROOF TIMING (depth {}):", DEFAULT_DEPTH);
        println!("─────────────────────────────────────────────────────────────\n");
        run_timing_benchmarks(DEFAULT_DEPTH);
    } else {
        println!("\n(Run with --time to include proof generation timing)");
    }
}

fn run_timing_benchmarks(depth: usize) {
    let mut rng = StdRng::seed_from_u64(42);

    let start = Instant::now();
    let keys = match setup_membership(&mut rng, depth) {
        Ok(k) => k,
        Err(e) => {
            println!("Setup failed: {}", e);
            return;
        }
    };
    println!("Setup completed in {:?}\n", start.elapsed());

    let fields = IdentityFields::new("3201010101900001", "Bench Subject", "19900101", "bench");
    let salt = Fr::from(12345u64);
    let leaf = match identity_commitment(&fields) {
        Ok(id) => leaf_commitment(id, salt, StatusTag::Active),
        Err(e) => {
            println!("Encoding failed: {}", e);
            return;
        }
    };
    let acc = match Accumulator::build(vec![leaf], depth) {
        Ok(a) => a,
        Err(e) => {
            println!("Accumulator build failed: {}", e);
            return;
        }
    };

    const RUNS: usize = 3;
    let mut times = Vec::new();
    let mut last = None;
    for _ in 0..RUNS {
        let Ok(path) = acc.proof(0) else { return };
        let start = Instant::now();
        last = prove_membership(&keys, &fields, salt, path, acc.root()).ok();
        times.push(start.elapsed().as_micros());
    }
    let avg_us = times.iter().sum::<u128>() / RUNS as u128;
    println!("Membership prove     avg {:>5}ms over {} runs", avg_us / 1000, RUNS);

    if let Some(result) = last {
        let start = Instant::now();
        let ok = verify_membership(&keys.verifying_key, &result.proof, &result.public_inputs);
        println!("Membership verify    {:?} in {:?}", ok, start.elapsed());
    }
}
