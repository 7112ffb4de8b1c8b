#![no_main]

use libfuzzer_sys::fuzz_target;
use peimage::Image;

fuzz_target!(|data: &[u8]| {
    let Ok(image) = Image::parse(data) else {
        return;
    };
    let bytes = image.to_bytes().expect("a parsed image always assembles");
    if image.section_table.is_some() {
        assert_eq!(bytes, data, "round trip changed the bytes");
    }
});
