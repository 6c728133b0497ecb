//! Fuzzes the temperature burst decoder.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_temperature_decode
#![no_main]
use batman_protocol::{MAX_CHIPS, RegisterStore, SENTINEL, decode_temperatures};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let words: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let mut store = RegisterStore::new();
    let outcome = decode_temperatures(&words, &mut store);
    assert_eq!(outcome.accepted + outcome.rejected, MAX_CHIPS);
    for chip in 0..MAX_CHIPS {
        assert_ne!(store.temperature_raw(chip).ok(), Some(SENTINEL));
    }
});
