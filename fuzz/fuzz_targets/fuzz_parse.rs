#![no_main]

use libfuzzer_sys::fuzz_target;
use peimage::Image;

fuzz_target!(|data: &[u8]| {
    // Malformed input must come back as an error, never a panic.
    let _ = Image::parse(data);
});
