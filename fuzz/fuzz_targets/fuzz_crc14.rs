//! Fuzzes the CRC-14 byte and residual-bit phases against each other.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_crc14
#![no_main]
use batman_protocol::{TrailingBits, command_pec, crc14_bits, crc14_bytes, payload_crc14};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&trailer, payload)) = data.split_first() else {
        return;
    };
    let _ = command_pec(payload);

    let whole = crc14_bytes(payload, 0x0010);
    assert!(whole <= 0x3FFF);

    // Feeding bytes through the bit phase one at a time gives the same result.
    let stepped = payload.iter().fold(0x0010, |crc, &b| crc14_bits(8, b, crc));
    assert_eq!(whole, stepped);

    let len = trailer >> 5;
    let with_trailer = payload_crc14(payload, 0x0010, Some(TrailingBits::new(len, trailer)));
    assert!(with_trailer <= 0x3FFF);
});
