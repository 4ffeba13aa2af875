//! Coyote Daemon - DG-Lab Coyote pairing and FIFO pulse queue
//!
//! ```text
//! coyoted start [-d]
//! coyoted stop
//! coyoted status
//! ```

fn main() -> anyhow::Result<()> {
    coyoted::cli::run()
}
