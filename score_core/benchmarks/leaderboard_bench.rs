use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use score_core::{Category, Grid, Leaderboard};
use score_proto::PlayerMap;

fn random_players(count: usize, seed: u64) -> PlayerMap {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..count)
        .map(|index| {
            let mut grid = Grid::new();
            for round in 1..=10 {
                for category in Category::EDITABLE {
                    if rng.gen_bool(0.7) {
                        grid.set_cell(round, category, rng.gen_range(0..40));
                    }
                }
            }
            (format!("player-{index:04}"), grid.to_record())
        })
        .collect()
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaderboard");

    for players in [4usize, 16, 64, 256] {
        let snapshot = random_players(players, 0x5eed);
        group.bench_with_input(
            BenchmarkId::new("rebuild", players),
            &snapshot,
            |b, snapshot| {
                b.iter_batched(
                    Leaderboard::default,
                    |mut board| {
                        board.rebuild(snapshot);
                        board
                    },
                    BatchSize::SmallInput,
                )
            },
        );

        let mut board = Leaderboard::default();
        board.rebuild(&snapshot);
        let own = Grid::from_record(&snapshot["player-0000"]);
        group.bench_with_input(BenchmarkId::new("highlight", players), &board, |b, board| {
            b.iter(|| {
                (1..=10)
                    .map(|round| board.highlight(&own, round, Category::Yellow))
                    .count()
            })
        });
    }

    group.finish();
}

criterion_group!(leaderboard_benches, bench_rebuild);
criterion_main!(leaderboard_benches);
