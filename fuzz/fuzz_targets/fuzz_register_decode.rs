//! Fuzzes the register reply decoders with arbitrary reply bytes.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_register_decode
#![no_main]
use batman_protocol::{Register, RegisterStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, frame)) = data.split_first() else {
        return;
    };
    let mut store = RegisterStore::new();
    for register in Register::ALL {
        if register.id() & 0x0F == selector & 0x0F || selector == 0xFF {
            // Must never panic, whatever the frame length.
            let outcome = register.decode(frame, &mut store);
            assert!(outcome.accepted + outcome.rejected > 0 || !register.is_decoded());
        }
    }
});
