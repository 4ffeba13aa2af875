//! Coyote - send pulses to a paired DG-Lab Coyote through coyoted
//!
//! See [`coyote_cli::cli`] for usage.

use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    coyote_cli::cli::run()
}
