//! End-to-end poll cycles against the in-memory chain.

use batman_engine::mock::{MockChip, MockTransport};
use batman_engine::prelude::*;
use batman_engine::sequencer::IDLE_TICKS_PER_CYCLE;
use batman_protocol::MAX_CHIPS;
use insta::assert_snapshot;
use std::time::Duration;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const FAST: Duration = Duration::from_millis(10);
const SLOW: Duration = Duration::from_millis(100);

fn chain_of(chips: Vec<MockChip>, config: ChainConfig) -> ChainResult<BmbChain<MockTransport>> {
    // A second init in the same binary fails; the first subscriber stays.
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .unwrap_or_default();
    BmbChain::new(MockTransport::with_chips(chips), config)
}

/// Tick until the sequencer has finished `cycles` more full cycles.
fn run_cycles(chain: &mut BmbChain<MockTransport>, cycles: u32, step: Duration) {
    let target = chain.cycle_count().wrapping_add(cycles);
    let per_cycle = 8 + u32::from(IDLE_TICKS_PER_CYCLE) + 1;
    for _ in 0..=per_cycle * cycles {
        if chain.cycle_count() == target {
            return;
        }
        chain.tick(step);
    }
}

fn tick_until(chain: &mut BmbChain<MockTransport>, state: PollState, step: Duration) {
    for _ in 0..64 {
        if chain.poll_state() == state {
            return;
        }
        chain.tick(step);
    }
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-2
}

#[test]
fn test_cycle_bus_trace() -> TestResult {
    let mut chain = chain_of(vec![MockChip::default(); 2], ChainConfig::new(1)?)?;
    let mut ticks = Vec::new();
    for _ in 0..7 {
        chain.tick(FAST);
        let heads: Vec<String> = chain
            .transport_mut()
            .take_frames()
            .iter()
            .filter_map(|frame| frame.first())
            .map(|word| format!("{word:04X}"))
            .collect();
        ticks.push(heads.join(" "));
    }
    assert_snapshot!(
        ticks.join(" | "),
        @"2AD4 2AD4 | 21F2 4D00 5000 | 21F2 2BFB | 21F2 2BFB | 21F2 4F00 4F00 4700 4800 4900 4A00 | 21F2 4F00 4F00 4B00 4C00 4D00 0E1B | 2AD4 2AD4 5000 112F 5000 21F2"
    );
    Ok(())
}

#[test]
fn test_settle_delays_between_commands() -> TestResult {
    let mut chain = chain_of(vec![MockChip::default(); 2], ChainConfig::new(1)?)?;
    run_cycles(&mut chain, 1, FAST);
    // Two snapshot states with one settle each, then six in each read state.
    assert_eq!(chain.transport().total_delay_us(), 14 * 125);
    Ok(())
}

#[test]
fn test_full_cycle_statistics() -> TestResult {
    let mut first = MockChip::with_cells_mv(&[3700; 12]);
    let mut second = MockChip::with_cells_mv(&[3700; 12]);
    first.chip_total = 34688;
    second.chip_total = 34688;
    first.temp1 = 6500;
    first.temp2 = 6400;
    second.temp1 = 6900;
    second.temp2 = 6600;
    first.temperature = 0x3305;
    second.supply = 62500;

    let mut chain = chain_of(vec![first, second], ChainConfig::new(1)?)?;
    run_cycles(&mut chain, 1, FAST);

    let stats = chain.statistics();
    assert_eq!(stats.cells.present, 24);
    assert_eq!(chain.snapshot().cells_per_chip, vec![12, 12]);
    assert_eq!(stats.cells.max_mv, 3700);
    assert_eq!(stats.cells.min_mv, 3700);
    assert_eq!(stats.cells.max_cell, Some(1));

    let pack = 2.0 * 34688.0 * 0.00128;
    assert!(close(stats.aux.pack_volts, pack));
    assert!(close(stats.aux.avg_cell_mv, pack / 24.0 * 1000.0));
    assert!(close(stats.aux.charge_limit_v, 4.2 * 24.0));
    assert!(close(stats.aux.discharge_limit_v, 3.0 * 24.0));

    assert!(close(stats.temperatures.max_c, 29.0));
    assert!(close(stats.temperatures.min_c, 24.0));
    assert_eq!(chain.chip_temperature_c(0).map(|t| close(t, 20.0)), Some(true));
    assert_eq!(chain.supply_mv(1).map(|mv| close(mv, 5000.0)), Some(true));
    assert_eq!(chain.cycle_count(), 1);
    assert_eq!(chain.poll_state(), PollState::CheckWake);
    Ok(())
}

#[test]
fn test_chip_zero_supply_published_from_wire_order() -> TestResult {
    // Decoded 0x3412 for chips 0 and 1 puts LE 0x1234 and 0x3412 on the wire.
    let mut first = MockChip::with_cells_mv(&[3700]);
    let mut second = MockChip::with_cells_mv(&[3700]);
    first.supply = 0x3412;
    second.supply = 0x3412;
    let mut chain = chain_of(vec![first, second], ChainConfig::new(1)?)?;
    run_cycles(&mut chain, 1, FAST);

    assert_eq!(chain.supply_mv(0).map(|mv| close(mv, 372.8)), Some(true));
    assert_eq!(chain.supply_mv(1).map(|mv| close(mv, 1066.4)), Some(true));
    Ok(())
}

#[test]
fn test_balancing_scenario() -> TestResult {
    let config = ChainConfig::builder()
        .boards(1)
        .balance_enabled(true)
        .balance_hysteresis_mv(20)
        .build()?;
    let mut chain = chain_of(vec![MockChip::with_cells_mv(&[3500, 3525, 3510])], config)?;
    run_cycles(&mut chain, 1, FAST);

    let summary = chain.balancing_summary();
    assert_eq!(summary.present, 3);
    assert_eq!(summary.balancing_count, 1);
    assert_eq!(summary.cells, vec![2]);
    assert_eq!(chain.balance_masks()[0], 0b010);
    Ok(())
}

#[test]
fn test_balance_writes_alternate_phase() -> TestResult {
    let config = ChainConfig::builder().boards(1).balance_enabled(true).build()?;
    let mut chain = chain_of(
        vec![MockChip::with_cells_mv(&[3500, 3600, 3600, 3500])],
        config,
    )?;
    run_cycles(&mut chain, 3, FAST);

    let writes = chain.transport().balance_writes();
    assert_eq!(writes.len(), 3);
    // The first write goes out before any reduction has run.
    assert_eq!(writes.first().map(|w| w[0]), Some(0));
    // Slots 1 and 2 are wanted; odd pass keeps slot 2, even pass keeps slot 1.
    assert_eq!(writes.get(1).map(|w| w[0]), Some(0b100));
    assert_eq!(writes.get(2).map(|w| w[0]), Some(0b010));
    assert_eq!(chain.transport().crc_errors(), 0);
    Ok(())
}

#[test]
fn test_balancing_mutes_before_reads() -> TestResult {
    let config = ChainConfig::builder().boards(1).balance_enabled(true).build()?;
    let mut chain = chain_of(vec![MockChip::with_cells_mv(&[3500, 3600])], config)?;
    run_cycles(&mut chain, 1, FAST);
    chain.transport_mut().take_frames();

    chain.tick(FAST);
    chain.tick(FAST);
    let frames = chain.transport_mut().take_frames();
    assert_eq!(frames.first(), Some(&vec![0x20DD, 0x0000]));
    Ok(())
}

#[test]
fn test_disabled_balancing_writes_zero_masks() -> TestResult {
    let mut chain = chain_of(
        vec![MockChip::with_cells_mv(&[3500, 3900, 3500, 3900])],
        ChainConfig::new(1)?,
    )?;
    run_cycles(&mut chain, 2, FAST);
    assert!(
        chain
            .transport()
            .balance_writes()
            .iter()
            .all(|masks| masks == &[0; MAX_CHIPS])
    );
    assert_eq!(chain.balancing_summary().balancing_count, 0);
    Ok(())
}

#[test]
fn test_timeout_triggers_rewake() -> TestResult {
    let mut chain = chain_of(vec![MockChip::default(); 2], ChainConfig::new(1)?)?;
    let first = chain.tick(FAST);
    assert_eq!((first.state, first.ops), (PollState::CheckWake, 1));
    run_cycles(&mut chain, 1, FAST);

    let quiet = chain.tick(FAST);
    assert_eq!((quiet.state, quiet.ops), (PollState::CheckWake, 0));

    // One silent cycle at the nominal tick is still inside the timeout.
    chain.transport_mut().set_silent(true);
    run_cycles(&mut chain, 1, SLOW);
    assert!(!chain.is_timed_out());

    run_cycles(&mut chain, 1, SLOW);
    let rewake = chain.tick(SLOW);
    assert_eq!((rewake.state, rewake.ops), (PollState::CheckWake, 1));
    assert!(chain.is_timed_out());
    Ok(())
}

#[test]
fn test_healthy_chain_at_nominal_tick_is_not_rewoken() -> TestResult {
    let mut chain = chain_of(vec![MockChip::with_cells_mv(&[3700]); 2], ChainConfig::new(1)?)?;
    run_cycles(&mut chain, 1, SLOW);

    for _ in 0..3 {
        assert!(!chain.is_timed_out());
        assert!(chain.snapshot().comms_ok);
        let check = chain.tick(SLOW);
        assert_eq!((check.state, check.ops), (PollState::CheckWake, 0));
        run_cycles(&mut chain, 1, SLOW);
    }
    assert_eq!(chain.cycle_count(), 4);
    Ok(())
}

#[test]
fn test_silent_chain_keeps_last_readings() -> TestResult {
    let mut chain = chain_of(
        vec![MockChip::with_cells_mv(&[3700, 3650])],
        ChainConfig::new(1)?,
    )?;
    run_cycles(&mut chain, 1, FAST);
    let before = chain.statistics().clone();

    chain.transport_mut().set_silent(true);
    run_cycles(&mut chain, 1, FAST);

    assert_eq!(chain.cell_voltages(), vec![3700, 3650]);
    assert_eq!(chain.statistics().cells, before.cells);
    assert!(chain.counters().rejected_words > 0);
    Ok(())
}

#[test]
fn test_transport_fault_mid_read_releases_chip_select() -> TestResult {
    let mut chain = chain_of(vec![MockChip::default(); 2], ChainConfig::new(1)?)?;
    tick_until(&mut chain, PollState::ReadCellsLow, FAST);
    chain.transport_mut().fail_after(5);

    let report = chain.tick(FAST);
    assert_eq!(report.state, PollState::ReadCellsLow);
    assert_eq!(report.transport_errors, 6);
    assert!(!chain.transport().chip_select_active());
    assert_eq!(chain.transport().exchanges_outside_chip_select(), 0);
    assert_eq!(chain.poll_state(), PollState::ReadCellsHigh);

    chain.transport_mut().heal();
    let report = chain.tick(FAST);
    assert_eq!(report.transport_errors, 0);
    assert!(report.outcome.accepted > 0);
    Ok(())
}

#[test]
fn test_chips_beyond_configuration_are_ignored() -> TestResult {
    let mut chips = vec![MockChip::with_cells_mv(&[3700]); 2];
    chips.push(MockChip::with_cells_mv(&[3000]));
    let mut chain = chain_of(chips, ChainConfig::new(1)?)?;
    run_cycles(&mut chain, 1, FAST);
    assert_eq!(chain.statistics().cells.present, 2);
    assert_eq!(chain.cell_v_min_mv(), 3700);
    Ok(())
}

#[test]
fn test_independent_chains() -> TestResult {
    let mut a = chain_of(vec![MockChip::with_cells_mv(&[3600]); 2], ChainConfig::new(1)?)?;
    let mut b = chain_of(vec![MockChip::with_cells_mv(&[4000]); 4], ChainConfig::new(2)?)?;
    run_cycles(&mut a, 1, FAST);
    run_cycles(&mut b, 1, FAST);
    assert_eq!(a.cell_v_max_mv(), 3600);
    assert_eq!(b.cell_v_max_mv(), 4000);
    assert_eq!(a.statistics().cells.present, 2);
    assert_eq!(b.statistics().cells.present, 4);
    Ok(())
}

#[test]
fn test_snapshot_publishes_cycle() -> TestResult {
    let mut chain = chain_of(
        vec![MockChip::with_cells_mv(&[3700, 3710]), MockChip::with_cells_mv(&[3690])],
        ChainConfig::new(1)?,
    )?;
    run_cycles(&mut chain, 1, FAST);

    let snapshot = chain.snapshot();
    assert_eq!(snapshot.cycle_count, 1);
    assert_eq!(snapshot.cells_present, 3);
    assert_eq!(snapshot.cell_voltages_mv, vec![3700, 3710, 3690]);
    assert_eq!(snapshot.cells_per_chip, vec![2, 1]);
    assert_eq!(snapshot.max_cell, Some(2));
    assert_eq!(snapshot.min_cell, Some(3));
    assert!(snapshot.comms_ok);

    let json = serde_json::to_value(&snapshot)?;
    assert_eq!(json["cell_delta_mv"], 20);
    Ok(())
}
