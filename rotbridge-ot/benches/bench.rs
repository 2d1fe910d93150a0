use std::{
    env,
    time::{Duration, Instant},
};

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{SeedableRng, rngs::StdRng};
use rotbridge_core::compute::ComputePool;
use rotbridge_net::{
    Channel,
    testing::{init_bench_tracing, local_channels},
};
use rotbridge_ot::{
    RotReceiver, RotSender, Security,
    base::SimplestOt,
    extension::{OtExtensionReceiver, OtExtensionSender},
    random_choices,
};
use tokio::runtime::{self, Runtime};

fn create_mt_runtime(threads: usize) -> Runtime {
    runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()
        .unwrap()
}

fn get_var_size(var: &str, default: u32) -> u32 {
    env::var(var)
        .map(|s| s.parse().expect("not a number"))
        .unwrap_or(default)
}

/// Extension time of `iters` runs, base OTs excluded.
async fn extension_time<S: Security>(
    c1: &mut Channel,
    c2: &mut Channel,
    count: usize,
    threads: usize,
    iters: u64,
) -> Duration {
    let mut duration = Duration::ZERO;
    for _ in 0..iters {
        // setup not included in duration
        let mut rng1 = StdRng::seed_from_u64(42);
        let rng2 = StdRng::seed_from_u64(42 * 42);
        let choices = random_choices(count, &mut rng1);
        let mut sender = OtExtensionSender::<S>::new_with_rng(rng1)
            .with_compute_pool(ComputePool::with_threads(threads).unwrap());
        let mut receiver = OtExtensionReceiver::<S>::new_with_rng(rng2)
            .with_compute_pool(ComputePool::with_threads(threads).unwrap());
        tokio::try_join!(sender.do_base_ots(c1), receiver.do_base_ots(c2)).unwrap();

        let now = Instant::now();
        tokio::try_join!(sender.send(c1, count), receiver.receive(c2, &choices)).unwrap();
        duration += now.elapsed();
    }
    duration
}

fn criterion_benchmark(c: &mut Criterion) {
    init_bench_tracing();
    let rt = create_mt_runtime(4);
    let (mut c1, mut c2) = rt.block_on(local_channels()).unwrap();

    let count = 128;
    c.bench_function("128 base OT", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let mut duration = Duration::ZERO;
                for _ in 0..iters {
                    let mut rng1 = StdRng::seed_from_u64(42);
                    let choices = random_choices(count, &mut rng1);
                    let mut sender = SimplestOt::new_with_rng(rng1);
                    let mut receiver = SimplestOt::new_with_rng(StdRng::seed_from_u64(42 * 42));
                    let now = Instant::now();
                    tokio::try_join!(
                        sender.send(&mut c1, count),
                        receiver.receive(&mut c2, &choices)
                    )
                    .unwrap();
                    duration += now.elapsed();
                }
                duration
            })
        })
    });

    let p = get_var_size("ROTBRIDGE_BENCH_OT_POWER", 20);
    let count = 2_usize.pow(p);
    let threads = get_var_size("ROTBRIDGE_BENCH_THREADS", 1) as usize;

    let mut g = c.benchmark_group("semi-honest OT extension");
    g.sample_size(10);
    g.throughput(criterion::Throughput::Elements(count as u64));
    g.bench_function(format!("2**{p} extension OTs, {threads} threads"), |b| {
        b.iter_custom(|iters| {
            rt.block_on(extension_time::<rotbridge_ot::SemiHonestMarker>(
                &mut c1, &mut c2, count, threads, iters,
            ))
        })
    });
    g.finish();

    let mut g = c.benchmark_group("malicious OT extension");
    g.sample_size(10);
    g.throughput(criterion::Throughput::Elements(count as u64));
    g.bench_function(format!("2**{p} extension OTs, {threads} threads"), |b| {
        b.iter_custom(|iters| {
            rt.block_on(extension_time::<rotbridge_ot::MaliciousMarker>(
                &mut c1, &mut c2, count, threads, iters,
            ))
        })
    });
    g.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
