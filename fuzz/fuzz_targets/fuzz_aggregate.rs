//! Fuzzes the pack reduction over arbitrary stored readings.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_aggregate
#![no_main]
use batman_engine::aggregator::{CellLimits, reduce_aux, reduce_cells, reduce_temperatures};
use batman_engine::balancing::BalancePolicy;
use batman_protocol::{MAX_CHIPS, RegisterStore, SLOTS_PER_CHIP};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&control, rest)) = data.split_first() else {
        return;
    };
    let chip_count = usize::from(control) % (MAX_CHIPS + 1);
    let mut store = RegisterStore::new();
    for (index, pair) in rest.chunks_exact(2).enumerate().take(MAX_CHIPS * SLOTS_PER_CHIP) {
        let mv = u16::from_le_bytes([pair[0], pair[1]]);
        let _ = store.set_cell_mv(index / SLOTS_PER_CHIP, index % SLOTS_PER_CHIP, mv);
        let _ = store.set_chip_total_raw(index % MAX_CHIPS, mv);
    }

    let policy = BalancePolicy::new(control & 0x80 != 0, u16::from(control));
    let cells = reduce_cells(&store, chip_count, &policy);
    assert!(cells.max_mv >= cells.min_mv);

    let _ = reduce_temperatures(&store, chip_count);
    let aux = reduce_aux(
        &store,
        chip_count,
        cells.present,
        CellLimits { high_mv: 4200, low_mv: 3000 },
    );
    assert!(aux.avg_cell_mv.is_finite());
});
