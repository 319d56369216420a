#![no_main]

use callscope::capture::parse_record;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Capture records must never panic the parser, whatever the input
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = parse_record(input);
    }
});
