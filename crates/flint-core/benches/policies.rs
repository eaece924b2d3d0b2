#![forbid(unsafe_code)]
//! Victim-policy throughput under an overwrite-heavy workload.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flint_config::{DeviceConfig, GcPolicyId};
use flint_core::FtlCore;
use flint_types::{Lba, NullCallback};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn config(policy: GcPolicyId) -> DeviceConfig {
    DeviceConfig {
        ssd_size: 1,
        package_size: 1,
        die_size: 2,
        plane_size: 64,
        block_size: 32,
        block_erase_count: u32::MAX,
        overprovisioning_pct: 10,
        gc_policy: policy,
    }
}

fn overwrite_workload(policy: GcPolicyId, writes: usize) {
    let cfg = config(policy);
    let mut ftl = FtlCore::new(&cfg).unwrap();
    let hot = ftl.max_lba().0 / 4;
    let mut rng = StdRng::seed_from_u64(0x746);
    let mut cb = NullCallback;
    for _ in 0..writes {
        let lba = rng.gen_range(0..=hot);
        ftl.write_translate(Lba(lba), &mut cb).unwrap();
    }
}

fn bench_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("overwrite_heavy");
    for (name, policy) in [
        ("round_robin", GcPolicyId::RoundRobin),
        ("lru", GcPolicyId::Lru),
        ("greedy", GcPolicyId::Greedy),
        ("cost_benefit", GcPolicyId::CostBenefit),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &policy, |b, &policy| {
            b.iter(|| overwrite_workload(policy, 20_000));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_policies);
criterion_main!(benches);
