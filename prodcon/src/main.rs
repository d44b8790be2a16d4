//! Producer/consumer micro-benchmark harness: spawns producer and
//! consumer threads against a chosen pool structure and prints a
//! summary line, grounded in `prodcon.cc` and the
//! `glue_ts_stack.cc`/`glue_ts_deque.cc` structure-selection flags.

use std::thread;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use pools::{
    AtomicCounterOracle, EliminationConfig, EliminationStackPool, FlatCombiningQueuePool, HardwareSerializedOracle,
    NoopLogger, Pool, PoolConfig, ThreadContext, TlArrayStackPool, TracingLogger, TsDequePool, TsQueuePool,
    TsStackPool,
};
use thiserror::Error;

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum Structure {
    #[value(name = "stack")]
    Stack,
    #[value(name = "ts-stack")]
    TsStack,
    #[value(name = "ts-stack-array")]
    TsStackArray,
    #[value(name = "ts-stack-2ts")]
    TsStack2ts,
    #[value(name = "ts-deque")]
    TsDeque,
    #[value(name = "ts-queue")]
    TsQueue,
    #[value(name = "elimination-stack")]
    EliminationStack,
    #[value(name = "flat-combining-queue")]
    FlatCombiningQueue,
}

/// Producer/consumer micro benchmark.
#[derive(Parser, Debug)]
#[command(name = "prodcon", about = "Producer/consumer micro benchmark")]
struct Cli {
    /// Number of producer threads.
    #[arg(long, default_value_t = 1)]
    producers: u64,

    /// Number of consumer threads.
    #[arg(long, default_value_t = 1)]
    consumers: u64,

    /// Number of put operations per producer.
    #[arg(long, default_value_t = 1000)]
    operations: u64,

    /// Simulated computational workload (busy-spin iterations) between
    /// operations.
    #[arg(long, default_value_t = 0)]
    c: u64,

    /// Pool structure to benchmark.
    #[arg(long, value_enum, default_value_t = Structure::TsStack)]
    structure: Structure,

    /// Use a barrier between producing and consuming: all elements are
    /// inserted before any is removed.
    #[arg(long, default_value_t = false)]
    barrier: bool,

    /// Unused in this port (arenas grow instead of being preallocated);
    /// accepted for CLI-surface parity with the original benchmark.
    #[arg(long, default_value = "1g")]
    prealloc_size: String,

    /// Log invocation/response/linearization of every operation via
    /// `tracing`.
    #[arg(long, default_value_t = false)]
    log_operations: bool,

    /// Spin-delay between the two samples of an interval timestamp.
    #[arg(long, default_value_t = 0)]
    delay: u64,

    /// Collision array size for the elimination-backoff stack.
    #[arg(long, default_value_t = 4)]
    size_collision: usize,
}

#[derive(Debug, Error)]
enum ConfigError {
    #[error("producers and consumers cannot both be zero")]
    NoThreads,
    #[error("--structure elimination-stack requires at least 2 threads, got {0}")]
    EliminationNeedsTwoThreads(u64),
    #[error(transparent)]
    Pool(#[from] pools::PoolError),
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "prodcon exiting with configuration error");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ConfigError> {
    if cli.producers == 0 && cli.consumers == 0 {
        return Err(ConfigError::NoThreads);
    }

    let num_threads = if cli.barrier {
        cli.producers.max(cli.consumers)
    } else {
        cli.producers + cli.consumers
    } as usize;
    let num_threads = num_threads.max(1);

    tracing::info!(
        ?cli.structure,
        producers = cli.producers,
        consumers = cli.consumers,
        operations = cli.operations,
        num_threads,
        "starting producer/consumer benchmark"
    );

    let pool_config = PoolConfig::new(num_threads, cli.delay)?;
    let pool = build_pool(cli.structure, pool_config, cli.size_collision, cli.log_operations)?;

    let start = Instant::now();
    if cli.barrier {
        run_barrier_mode(&pool, &cli, num_threads);
    } else {
        run_pipelined_mode(&pool, &cli, num_threads);
    }
    let elapsed = start.elapsed();

    let num_operations: u64 = if cli.barrier || cli.consumers == 0 {
        cli.operations * cli.producers
    } else {
        cli.operations * cli.producers * 2
    };
    let throughput = if elapsed.as_millis() > 0 {
        (num_operations as f64) / (elapsed.as_millis() as f64 / 1000.0)
    } else {
        0.0
    };

    let mut summary = format!(
        "threads: {} ;producers: {} consumers: {} ;runtime: {} ;operations: {} ;c: {} ;aggr: {:.0}",
        num_threads,
        cli.producers,
        cli.consumers,
        elapsed.as_millis(),
        cli.operations,
        cli.c,
        throughput,
    );
    if let Some(stats) = pool.ds_get_stats() {
        summary.push(' ');
        summary.push_str(&stats);
    }
    println!("{summary}");

    Ok(())
}

fn make_logger(log_operations: bool) -> Box<dyn pools::OperationLogger> {
    if log_operations {
        Box::new(TracingLogger)
    } else {
        Box::new(NoopLogger)
    }
}

fn build_pool(
    structure: Structure,
    config: PoolConfig,
    size_collision: usize,
    log_operations: bool,
) -> Result<Box<dyn Pool<u64> + Send + Sync>, ConfigError> {
    Ok(match structure {
        // The plain "stack" alias and "ts-stack"/"ts-stack-2ts" all
        // realize `TsStackBuffer` over the same hardware-serialized
        // interval oracle: §4.2's note that the default and TL2TS
        // variants are the same algorithm over different interval
        // sources collapses to one type here, since our crate has a
        // single `IntervalOracle` implementor.
        Structure::Stack | Structure::TsStack | Structure::TsStack2ts => Box::new(TsStackPool::with_logger(
            config,
            HardwareSerializedOracle::new(config.delay),
            make_logger(log_operations),
        )),
        Structure::TsStackArray => Box::new(TlArrayStackPool::with_logger(
            config,
            AtomicCounterOracle::new(),
            make_logger(log_operations),
        )),
        Structure::TsDeque => Box::new(TsDequePool::with_logger(
            config,
            HardwareSerializedOracle::new(config.delay),
            make_logger(log_operations),
        )),
        Structure::TsQueue => Box::new(TsQueuePool::with_logger(
            config,
            HardwareSerializedOracle::new(config.delay),
            make_logger(log_operations),
        )),
        Structure::EliminationStack => {
            if config.num_threads < 2 {
                return Err(ConfigError::EliminationNeedsTwoThreads(config.num_threads as u64));
            }
            let elim_config = EliminationConfig::new(config, size_collision)?;
            Box::new(EliminationStackPool::with_logger(elim_config, make_logger(log_operations)))
        }
        Structure::FlatCombiningQueue => {
            Box::new(FlatCombiningQueuePool::with_logger(config, make_logger(log_operations)))
        }
    })
}

fn run_pipelined_mode(pool: &(dyn Pool<u64> + Send + Sync), cli: &Cli, num_threads: usize) {
    thread::scope(|scope| {
        // Lower thread indices go to producers, per prodcon.cc's note
        // that this ordering (rather than alternating ids) lets the
        // queue fill slightly ahead of the first consumer reads.
        for tid in 0..cli.producers as usize {
            scope.spawn(move || {
                let ctx = ThreadContext::new(tid, num_threads);
                for i in 1..=cli.operations {
                    let item = tid as u64 * cli.operations + i;
                    if !pool.put(&ctx, item) {
                        panic!("put operation failed");
                    }
                    busy_spin(cli.c);
                }
            });
        }
        for consumer_idx in 0..cli.consumers as usize {
            let total_ops = cli.operations * cli.producers;
            scope.spawn(move || {
                let ctx = ThreadContext::new(cli.producers as usize + consumer_idx, num_threads);
                let mut share = total_ops / cli.consumers;
                if (total_ops % cli.consumers) > consumer_idx as u64 {
                    share += 1;
                }
                let mut out = 0u64;
                let mut done = 0u64;
                while done < share {
                    if pool.get(&ctx, &mut out) {
                        done += 1;
                    }
                    busy_spin(cli.c);
                }
            });
        }
    });
}

fn run_barrier_mode(pool: &(dyn Pool<u64> + Send + Sync), cli: &Cli, num_threads: usize) {
    thread::scope(|scope| {
        for tid in 0..cli.producers as usize {
            scope.spawn(move || {
                let ctx = ThreadContext::new(tid, num_threads);
                for i in 1..=cli.operations {
                    let item = tid as u64 * cli.operations + i;
                    if !pool.put(&ctx, item) {
                        panic!("put operation failed");
                    }
                    busy_spin(cli.c);
                }
            });
        }
    });

    thread::scope(|scope| {
        let total_to_drain = cli.operations * cli.producers;
        for consumer_idx in 0..cli.consumers as usize {
            scope.spawn(move || {
                let ctx = ThreadContext::new(consumer_idx, num_threads);
                let mut share = total_to_drain / cli.consumers;
                if (total_to_drain % cli.consumers) > consumer_idx as u64 {
                    share += 1;
                }
                let mut out = 0u64;
                let mut done = 0u64;
                while done < share {
                    if pool.get(&ctx, &mut out) {
                        done += 1;
                    }
                    busy_spin(cli.c);
                }
            });
        }
    });
}

/// Stand-in for the original's `calculate_pi(c)` simulated workload:
/// a data-dependent busy loop that the optimizer can't fold away.
fn busy_spin(c: u64) {
    let mut acc = 0u64;
    for i in 0..c {
        acc = acc.wrapping_add(i ^ (i >> 3));
    }
    std::hint::black_box(acc);
}
