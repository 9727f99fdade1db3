//! Ordered map over a worker pool
//!
//! Five jobs of increasing length run on three threads. Results are printed
//! as soon as each one is available in submission order, so a slow early job
//! holds back faster later ones.

use chrono::Local;
use flag_fetch::WorkerPool;
use std::time::Duration;

fn display(msg: impl std::fmt::Display) {
    println!("{} {msg}", Local::now().format("[%H:%M:%S]"));
}

fn loiter(n: u64) -> u64 {
    let tabs = "\t".repeat(n as usize);
    display(format!("{tabs}loiter({n}): doing nothing for {n}s..."));
    std::thread::sleep(Duration::from_secs(n));
    display(format!("{tabs}loiter({n}): done."));
    n * 10
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    display("Script starting.");
    let pool = WorkerPool::new(3, "loiter")?;
    let results = pool.map(loiter, 0..5)?;
    display("results: <ordered iterator>");
    display("Waiting for individual results:");
    for (i, result) in results.enumerate() {
        display(format!("result {i}: {}", result?));
    }
    pool.join();
    Ok(())
}
