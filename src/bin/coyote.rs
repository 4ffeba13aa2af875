//! Coyote - send pulses to a paired DG-Lab Coyote through coyoted
//!
//! ```text
//! coyote shock A 25 20 5
//! coyote status
//! coyote pair
//! coyote set-max 40
//! coyote watch
//! ```

use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    coyote_cli::cli::run()
}
