//! Scribe share server binary.
//! Run with: cargo run --bin scribe-share

use std::process::ExitCode;

use scribe_client::start_scribe;

fn main() -> ExitCode {
    start_scribe::run()
}
