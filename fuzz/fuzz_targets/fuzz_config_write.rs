//! Fuzzes the balance frame encoder with arbitrary masks.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_config_write
#![no_main]
use batman_protocol::config_write::record_mask;
use batman_protocol::{BalancePhase, MAX_CHIPS, encode_config_write};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 * MAX_CHIPS + 1 {
        return;
    }
    let mut masks = [0u16; MAX_CHIPS];
    for (mask, pair) in masks.iter_mut().zip(data.chunks_exact(2)) {
        *mask = u16::from_le_bytes([pair[0], pair[1]]);
    }
    let phase = if data[2 * MAX_CHIPS] & 1 == 0 {
        BalancePhase::Even
    } else {
        BalancePhase::Odd
    };

    let words = encode_config_write(&masks, phase);
    for record in words[1..].chunks_exact(3) {
        let mask = record_mask(record[1]);
        // No two neighbouring slots in one write.
        assert_eq!(mask & (mask << 1), 0);
        assert!(record[2] <= 0x3FFF);
    }
});
