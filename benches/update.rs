use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use apforest::data::Batch;
use apforest::{Ensemble, EnsembleConfig};

fn random_batch(rng: &mut StdRng, n_rows: usize, n_cols: usize) -> Batch {
    let data: Vec<f64> = (0..n_rows * n_cols).map(|_| rng.gen_range(-100.0..100.0)).collect();
    Batch::F64(Array2::from_shape_vec((n_rows, n_cols), data).expect("rectangular batch"))
}

fn update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    group.significance_level(0.05).measurement_time(std::time::Duration::new(10, 0));

    for &(n_trees, leaf_max_size) in &[(8usize, 32usize), (16, 128)] {
        let bench_name = format!("n_trees={n_trees}-leaf_max_size={leaf_max_size}");
        group.bench_function(&bench_name, |b| {
            b.iter_batched(
                || {
                    let ensemble = Ensemble::new(EnsembleConfig {
                        n_trees,
                        leaf_max_size,
                        ..Default::default()
                    });
                    let rng = StdRng::seed_from_u64(42);
                    (ensemble, rng)
                },
                |(mut ensemble, mut rng)| {
                    for _ in 0..20 {
                        let batch = random_batch(&mut rng, 256, 16);
                        ensemble.update(batch).expect("dimension/dtype fixed for the life of this benchmark");
                    }
                    ensemble
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, update);
criterion_main!(benches);
