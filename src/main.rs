//! yshard - partition YAML files across shards with rendezvous hashing

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = yshard::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
