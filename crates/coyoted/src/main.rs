//! Coyote Daemon - DG-Lab Coyote pairing and FIFO pulse queue
//!
//! See [`coyoted::cli`] for usage.

fn main() -> anyhow::Result<()> {
    coyoted::cli::run()
}
