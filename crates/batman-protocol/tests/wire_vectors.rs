//! Snapshot tests for words that go out on the wire.
//!
//! Frames are pinned word-for-word, so any change to the checksum or framing
//! code shows up as a snapshot diff.

use batman_protocol::{BalancePhase, Command, MAX_CHIPS, Register, encode_config_write};
use insta::assert_snapshot;

fn hex_words(words: &[u16]) -> String {
    words
        .iter()
        .map(|w| format!("{w:04X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn test_broadcast_command_words() {
    let words: Vec<u16> = Command::ALL.iter().map(|cmd| cmd.word()).collect();
    assert_snapshot!(hex_words(&words), @"2AD4 20DD 21F2 2BFB 0E1B 112F");
}

#[test]
fn test_register_read_headers() {
    let words: Vec<u16> = Register::ALL.iter().flat_map(|reg| reg.header()).collect();
    assert_snapshot!(
        hex_words(&words),
        @"4700 7000 4800 3400 4900 DD00 4A00 C900 4B00 2000 4C00 E100 4D00 0800 4E00 1C00 4F00 F500 5000 9400"
    );
}

#[test]
fn test_idle_balance_frame() {
    let words = encode_config_write(&[0; MAX_CHIPS], BalancePhase::Even);
    assert_snapshot!(
        hex_words(&words),
        @"112F F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC"
    );
}

#[test]
fn test_balance_frame_even_phase() {
    let masks = [0x7FFF, 0, 0, 0, 0, 0, 0, 0x0001];
    let words = encode_config_write(&masks, BalancePhase::Even);
    assert_snapshot!(
        hex_words(&words),
        @"112F F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 AA2A 2304"
    );
}

#[test]
fn test_balance_frame_odd_phase() {
    let masks = [0x7FFF, 0, 0, 0, 0, 0, 0, 0x0001];
    let words = encode_config_write(&masks, BalancePhase::Odd);
    assert_snapshot!(
        hex_words(&words),
        @"112F F300 0100 16D0 F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 5555 3EB3"
    );
}

#[test]
fn test_balance_frame_sparse_masks() {
    let masks = [0x0124, 0x4010, 0, 0, 0, 0, 0, 0];
    let words = encode_config_write(&masks, BalancePhase::Odd);
    assert_snapshot!(
        hex_words(&words),
        @"112F F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 0000 38DC F300 1040 07AA F300 0401 0D36"
    );
}
