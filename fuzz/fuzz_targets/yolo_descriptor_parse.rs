//! Fuzz target for `obj.data` descriptor parsing and item id derivation.

#![no_main]

use dsport::ir::io_yolo::{name_from_path, parse_descriptor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    for (_, value) in parse_descriptor(text) {
        let _ = name_from_path(&value);
    }
    for line in text.lines() {
        let _ = name_from_path(line);
    }
});
