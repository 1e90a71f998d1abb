//! # Client Benchmark Harness
//!
//! Purpose: Drive SET and GET load through one shared connection pool so
//! client-side throughput can be compared over time.
//!
//! ## Design Principles
//! 1. **Public API Only**: Commands go through `ConnectionPool::execute`.
//! 2. **Allocation Control**: Keys and the value are built before timing starts.
//! 3. **Fixed Concurrency**: Each worker thread issues an equal share of ops.
//!
//! Usage: `rkv-bench [host] [port] [threads] [ops] [value_size]`, with the
//! optional `RKV_AUTH` environment variable carrying an auth token.

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rkv_client::{Arg, ClientConfig, ConnectionPool};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_THREADS: usize = 4;
const DEFAULT_OP_COUNT: usize = 100_000;
const DEFAULT_VALUE_SIZE: usize = 128;
const KEY_SPACE: usize = 1 << 12;

struct BenchConfig {
    host: String,
    port: u16,
    threads: usize,
    op_count: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(args.next(), DEFAULT_PORT);
        let threads = parse_or(args.next(), DEFAULT_THREADS).max(1);
        let op_count = parse_or(args.next(), DEFAULT_OP_COUNT);
        let value_size = parse_or(args.next(), DEFAULT_VALUE_SIZE);

        BenchConfig {
            host,
            port,
            threads,
            op_count,
            value_size,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, fallback: T) -> T {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn report(label: &str, ops: usize, failures: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!(
        "{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op, {failures} failed)"
    );
}

/// Splits `op_count` over the workers and runs `op` once per index.
fn run_phase<F>(pool: &ConnectionPool, config: &BenchConfig, op: F) -> (u64, Duration)
where
    F: Fn(&ConnectionPool, usize) -> bool + Sync,
{
    let failures = AtomicU64::new(0);
    let per_thread = config.op_count / config.threads;
    let start = Instant::now();

    thread::scope(|scope| {
        for worker in 0..config.threads {
            let failures = &failures;
            let op = &op;
            scope.spawn(move || {
                for idx in 0..per_thread {
                    if !op(pool, worker * per_thread + idx) {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    (failures.into_inner(), start.elapsed())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        eprintln!("rkv-bench failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = BenchConfig::from_args();
    let pool = ConnectionPool::new(ClientConfig {
        host: config.host.clone(),
        port: config.port,
        timeout_secs: 10,
        max_connections: config.threads,
        auth: env::var("RKV_AUTH").ok(),
        ..ClientConfig::default()
    })
    .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;

    info!(
        connections = pool.max_connections(),
        threads = config.threads,
        ops = config.op_count,
        value_size = config.value_size,
        "starting benchmark"
    );

    let keys: Vec<Arg> = (0..KEY_SPACE)
        .map(|idx| Arg::from(format!("rkv-bench:{idx:05}")))
        .collect();
    let value = Arg::from(vec![b'x'; config.value_size]);
    let ops = (config.op_count / config.threads) * config.threads;

    let (failures, elapsed) = run_phase(&pool, &config, |pool, idx| {
        let args = [keys[idx % KEY_SPACE].clone(), value.clone()];
        matches!(pool.execute("set", &args), Ok(reply) if reply.is_ok())
    });
    report("SET", ops, failures, elapsed);

    let (failures, elapsed) = run_phase(&pool, &config, |pool, idx| {
        let args = [keys[idx % KEY_SPACE].clone()];
        matches!(pool.execute("get", &args), Ok(reply) if reply.is_ok())
    });
    report("GET", ops, failures, elapsed);

    if failures > 0 {
        warn!(failures, "some GET replies were not ok");
    }
    pool.close();
    Ok(())
}
