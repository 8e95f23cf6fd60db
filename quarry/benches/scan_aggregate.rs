use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use granite::{
    BufferManager, BufferPool, Catalog, Field, HeapFile, StorageConfig, Transaction, Tuple,
    TupleDesc, Type,
};
use quarry::executor::drain;
use quarry::{Aggregate, AggregateOp, Executor, SeqScan};
use rand::Rng;
use tempfile::TempDir;

const ROWS: usize = 20_000;

fn setup() -> (TempDir, Arc<Catalog>, Arc<BufferPool>, u32) {
    let dir = TempDir::new().unwrap();
    let desc = Arc::new(TupleDesc::with_names(&[Type::Int, Type::Int], &["bucket", "amount"]));
    let catalog = Arc::new(Catalog::new());
    let file = HeapFile::open(dir.path().join("bench.dat"), desc.clone(), 4096).unwrap();
    let table_id = catalog.add_table(file, "bench");
    let config = StorageConfig::default().with_pool_pages(256);
    let pool = Arc::new(BufferPool::new(config, catalog.clone()).unwrap());

    let mut rng = rand::thread_rng();
    let tx = Transaction::start();
    for _ in 0..ROWS {
        let row = Tuple::with_fields(
            desc.clone(),
            vec![
                Field::Int(rng.gen_range(0..64)),
                Field::Int(rng.gen_range(-1000..1000)),
            ],
        )
        .unwrap();
        pool.insert_tuple(tx.id(), table_id, row).unwrap();
    }
    tx.commit(&pool).unwrap();
    (dir, catalog, pool, table_id)
}

fn bench_scan_aggregate(c: &mut Criterion) {
    let (_dir, catalog, pool, table_id) = setup();
    let shared: Arc<dyn BufferManager> = pool.clone();

    c.bench_function("seq_scan", |b| {
        b.iter(|| {
            let tx = Transaction::start();
            let mut scan = SeqScan::new(shared.clone(), &catalog, tx.id(), table_id, "b").unwrap();
            let rows = drain(&mut scan).unwrap();
            scan.close();
            tx.commit(&pool).unwrap();
            black_box(rows.len())
        })
    });

    c.bench_function("grouped_sum", |b| {
        b.iter(|| {
            let tx = Transaction::start();
            let scan = SeqScan::new(shared.clone(), &catalog, tx.id(), table_id, "b").unwrap();
            let mut agg = Aggregate::new(Box::new(scan), 1, Some(0), AggregateOp::Sum).unwrap();
            let groups = drain(&mut agg).unwrap();
            agg.close();
            tx.commit(&pool).unwrap();
            black_box(groups.len())
        })
    });
}

criterion_group!(benches, bench_scan_aggregate);
criterion_main!(benches);
