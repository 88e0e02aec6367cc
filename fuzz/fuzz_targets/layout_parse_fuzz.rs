#![no_main]
use alloy_primitives::B256;
use contract_introspect::StorageLayout;
use libfuzzer_sys::fuzz_target;

// Parsing must reject bad input with an error, and every accepted slot must
// be extractable at its declared width.
fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(layout) = StorageLayout::parse(json) else {
        return;
    };

    for slot in &layout.storage {
        assert!(slot.offset < 32);
        assert!(slot.slot_index().is_ok());
        let width = layout.type_width(&slot.type_tag).unwrap_or(32);
        let _ = slot.extract(B256::repeat_byte(0xFF), width);
    }
});
