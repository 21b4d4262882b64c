//! Export the membership verifying key.
//!
//! Loads (or generates) the membership keys for a tree depth and prints the
//! verifying key as hex, also writing `verifying_key.json` next to the keys.
//!
//! Usage:
//!   cargo run --release --bin export-vk -- [keys_dir] [depth]

use std::path::PathBuf;
use std::process::ExitCode;

use identity_circuits::DEFAULT_DEPTH;
use identity_prover::{load_or_setup, SetupError};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let keys_dir = PathBuf::from(args.get(1).map(String::as_str).unwrap_or("keys"));
    let depth = match args.get(2).map(|d| d.parse::<usize>()) {
        None => DEFAULT_DEPTH,
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            eprintln!("Invalid depth: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(keys_dir, depth) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(keys_dir: PathBuf, depth: usize) -> Result<(), SetupError> {
    println!("Loading or generating membership keys (depth {})...", depth);
    let keys = load_or_setup(&keys_dir, depth)?;

    let vk = keys.serialize_vk()?;
    println!("\n=== Membership Verifying Key ===\n");
    println!("Membership VK ({} bytes):", vk.len());
    println!("0x{}\n", hex::encode(&vk));

    let json = serde_json::json!({
        "circuit": identity_circuits::MEMBERSHIP_CIRCUIT_ID,
        "depth": depth,
        "public_inputs": ["root", "identity_commitment"],
        "verifying_key": format!("0x{}", hex::encode(&vk)),
    });

    let json_path = keys_dir.join("verifying_key.json");
    let body = serde_json::to_string_pretty(&json)
        .map_err(|e| SetupError::Serialization(e.to_string()))?;
    std::fs::write(&json_path, body)?;
    println!("JSON exported to {:?}", json_path);
    Ok(())
}
