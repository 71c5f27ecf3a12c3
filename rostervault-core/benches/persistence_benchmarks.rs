/*!
Benchmarks for save, load and backup fallback.
*/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rostervault_core::roster::{default_team, TeamSlot};
use rostervault_core::{
    KeyValueStore, MemoryStore, PersistConfig, PersistenceEngine, ReportedQuotaProbe,
};

fn roster(slots: usize) -> Vec<TeamSlot> {
    let mut team = default_team();
    while team.len() < slots {
        let mut slot = TeamSlot::empty(format!("slot-{}", team.len()));
        slot.nickname = format!("Box {}", team.len());
        team.push(slot);
    }
    team
}

/// Engine over a store with a known quota, so the probe answers without trial writes
fn engine() -> (PersistenceEngine<MemoryStore, ReportedQuotaProbe>, MemoryStore) {
    let store = MemoryStore::with_quota(5 * 1024 * 1024);
    let engine = PersistenceEngine::with_probe(
        store.clone(),
        ReportedQuotaProbe::default(),
        PersistConfig::default(),
    )
    .unwrap();
    (engine, store)
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");
    for slots in [6usize, 60, 600] {
        let team = roster(slots);
        let (engine, _) = engine();
        group.bench_with_input(BenchmarkId::from_parameter(slots), &team, |b, team| {
            b.iter(|| engine.save(black_box(team)).unwrap())
        });
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let (engine, store) = engine();
    engine.save(&roster(60)).unwrap();
    engine.save(&roster(60)).unwrap();

    c.bench_function("load_primary", |b| {
        b.iter(|| black_box(engine.load::<Vec<TeamSlot>>()))
    });

    store.set(&engine.keys().team, "corrupt").unwrap();
    c.bench_function("load_from_backup", |b| {
        b.iter(|| black_box(engine.load::<Vec<TeamSlot>>()))
    });
}

criterion_group!(benches, bench_save, bench_load);
criterion_main!(benches);
