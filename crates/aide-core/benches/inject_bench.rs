use aide_core::{build_memory_block, Kind, MemoryRecord, Role};
use criterion::{criterion_group, criterion_main, Criterion};
use time::OffsetDateTime;

fn mk_record(id: i64, kind: Kind) -> MemoryRecord {
    let role = if id % 2 == 0 { Role::Assistant } else { Role::User };
    MemoryRecord {
        id,
        user_id: "bench".to_string(),
        role,
        content: format!("benchmark turn {id} with a short but realistic sentence"),
        kind,
        deleted: false,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn bench_memory_block(c: &mut Criterion) {
    let chat = (0..1_000).map(|i| mk_record(i * 2 + 1, Kind::Chat)).collect::<Vec<_>>();
    let remembered = (0..1_000).map(|i| mk_record(i * 2 + 2, Kind::Remembered)).collect::<Vec<_>>();

    c.bench_function("memory_block_merge_2000_records", |b| {
        b.iter(|| {
            let block = build_memory_block(&chat, &remembered, 20);
            if block.is_empty() {
                panic!("benchmark block should never be empty");
            }
        });
    });
}

criterion_group!(inject_benches, bench_memory_block);
criterion_main!(inject_benches);
