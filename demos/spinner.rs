//! Spinner shown while a slow computation runs
//!
//! ```bash
//! cargo run --example spinner
//! cargo run --example spinner -- thread
//! ```
//!
//! The default waits on a tokio task; `thread` blocks the main thread and
//! draws from a spinner thread instead.

use flag_fetch::{supervise, supervise_blocking};
use std::time::Duration;

async fn slow() -> u32 {
    tokio::time::sleep(Duration::from_secs(3)).await;
    42
}

fn slow_blocking() -> u32 {
    std::thread::sleep(Duration::from_secs(3));
    42
}

fn main() -> std::io::Result<()> {
    let result = match std::env::args().nth(1).as_deref() {
        Some("thread") => {
            supervise_blocking("thinking!", Box::new(std::io::stdout()), slow_blocking)
        }
        _ => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(supervise("thinking!", Box::new(std::io::stdout()), slow())),
    };
    println!("Answer: {result}");
    Ok(())
}
