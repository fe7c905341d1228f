//! Basic usage example for the tbf crate.
//!
//! Run with: `cargo run --example basic`

use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};
use tbf::{LimiterConfig, LimiterError, TokenBucketLimiter, TokenBucketLimiterBuilder};

fn main() -> Result<(), LimiterError> {
    println!("=== Basic Token Bucket Example ===\n");

    blocking_fetch_example()?;

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    throttled_read_example()?;

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    shared_bucket_example()?;

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    error_example()?;

    Ok(())
}

fn blocking_fetch_example() -> Result<(), LimiterError> {
    println!("1. Blocking fetch:");

    let limiter = TokenBucketLimiter::with_config(LimiterConfig::new(4, 200))?;
    let handle = limiter.create(10, 100)?;
    println!("   Created bucket {} (rate 10 per 200ms, capacity 100)", handle);

    let start = Instant::now();
    let granted = limiter.fetch(handle, 50)?;
    println!(
        "   fetch(50) returned {} after {:?}",
        granted,
        start.elapsed()
    );

    limiter.return_tokens(handle, 5)?;
    println!(
        "   returned 5, bucket now holds {}",
        limiter.available_tokens(handle)?
    );

    limiter.destroy(handle)?;
    Ok(())
}

fn throttled_read_example() -> Result<(), LimiterError> {
    println!("2. Throttled read (fetch budget, return the unused part):");

    let limiter = TokenBucketLimiterBuilder::new()
        .max_limiters(1)
        .refill_interval_ms(100)
        .build()?;
    // 256 bytes per 100ms, bursts up to 1 KiB
    let handle = limiter.create(256, 1024)?;

    let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
    let mut source = text.as_bytes();
    let mut buf = [0u8; 512];
    let mut total = 0usize;
    let start = Instant::now();

    loop {
        let budget = limiter.fetch(handle, buf.len() as u64)? as usize;
        let n = source.read(&mut buf[..budget]).expect("reading from a byte slice");
        if n < budget {
            limiter.return_tokens(handle, (budget - n) as u64)?;
        }
        if n == 0 {
            break;
        }
        total += n;
    }

    println!(
        "   Copied {} bytes in {:?} ({} sweeps)",
        total,
        start.elapsed(),
        limiter.refill_ticks()
    );
    println!("\n{}", limiter.metrics(handle)?);
    Ok(())
}

fn shared_bucket_example() -> Result<(), LimiterError> {
    println!("3. Several threads sharing one bucket:");

    let limiter = TokenBucketLimiter::with_config(LimiterConfig::new(4, 50))?;
    let handle = limiter.create(20, 40)?;

    thread::scope(|s| {
        for id in 0..4 {
            let limiter = &limiter;
            s.spawn(move || {
                let mut got = 0;
                while got < 30 {
                    match limiter.fetch_timeout(handle, 7, Duration::from_secs(2)) {
                        Ok(n) => got += n,
                        Err(err) => {
                            println!("   worker {} stopped: {}", id, err);
                            return;
                        }
                    }
                }
                println!("   worker {} consumed {} tokens", id, got);
            });
        }
    });

    println!("\n{}", limiter.stats());
    Ok(())
}

fn error_example() -> Result<(), LimiterError> {
    println!("4. Errors:");

    let limiter = TokenBucketLimiter::with_config(LimiterConfig::new(1, 1000))?;
    let handle = limiter.create(1, 1)?;

    if let Err(err) = limiter.create(1, 1) {
        println!("   second create: {}", err);
    }
    if let Err(err) = limiter.fetch(handle, 0) {
        println!("   fetch(0): {}", err);
    }

    limiter.destroy(handle)?;
    if let Err(err) = limiter.fetch(handle, 1) {
        println!("   fetch after destroy: {}", err);
    }
    Ok(())
}
