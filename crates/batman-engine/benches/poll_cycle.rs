//! Cost of one full poll cycle and of the reduction pass on a full chain.

use batman_engine::aggregator::{reduce_cells, reduce_temperatures};
use batman_engine::balancing::BalancePolicy;
use batman_engine::mock::{MockChip, MockTransport};
use batman_engine::{BmbChain, ChainConfig, PollState};
use batman_protocol::{MAX_CHIPS, RegisterStore, SLOTS_PER_CHIP};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(10);

fn full_chain() -> Vec<MockChip> {
    (0..MAX_CHIPS)
        .zip(0u16..)
        .map(|(_, chip)| {
            let cells: Vec<u16> = (0..12u16).map(|i| 3650 + i * 5 + chip).collect();
            MockChip::with_cells_mv(&cells)
        })
        .collect()
}

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_cycle");
    group.bench_function("four_boards", |b| {
        b.iter(|| {
            let config = ChainConfig::builder().boards(4).balance_enabled(true).build();
            let Ok(config) = config else {
                return;
            };
            let Ok(mut chain) = BmbChain::new(MockTransport::with_chips(full_chain()), config)
            else {
                return;
            };
            while chain.poll_state() != PollState::Idle {
                black_box(chain.tick(TICK));
            }
            black_box(chain.cell_v_max_mv());
        });
    });
    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut store = RegisterStore::new();
    for chip in 0..MAX_CHIPS {
        for (slot, step) in (0..SLOTS_PER_CHIP).zip(0u16..) {
            if store.set_cell_mv(chip, slot, 3600 + step * 7).is_err() {
                return;
            }
        }
    }
    let policy = BalancePolicy::new(true, 20);

    let mut group = c.benchmark_group("reduce");
    group.bench_function("cells", |b| {
        b.iter(|| black_box(reduce_cells(black_box(&store), MAX_CHIPS, &policy)));
    });
    group.bench_function("temperatures", |b| {
        b.iter(|| black_box(reduce_temperatures(black_box(&store), MAX_CHIPS)));
    });
    group.finish();
}

criterion_group!(benches, bench_cycle, bench_reduce);
criterion_main!(benches);
