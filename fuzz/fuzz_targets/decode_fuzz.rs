#![no_main]
use alloy_json_abi::JsonAbi;
use contract_introspect::abi;
use libfuzzer_sys::fuzz_target;
use std::sync::LazyLock;

static ABI: LazyLock<JsonAbi> = LazyLock::new(|| {
    serde_json::from_str(
        r#"[
            {"type":"function","name":"checkpoint","stateMutability":"view","inputs":[],
             "outputs":[{"name":"index","type":"uint64"},{"name":"root","type":"bytes32"},{"name":"owner","type":"address"}]},
            {"type":"function","name":"roots","stateMutability":"view","inputs":[],
             "outputs":[{"name":"","type":"bytes32[]"},{"name":"","type":"bytes"}]}
        ]"#,
    )
    .unwrap()
});

// Arbitrary return data decodes or errors; checked getters never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(result) = abi::decode(&ABI, "checkpoint", data) {
        assert_eq!(result.len(), 3);
        let _ = result.try_get::<u64>(0);
        let _ = result.try_get::<[u8; 32]>(1);
        let _ = result.try_get::<alloy_primitives::Address>(2);
    }
    if let Ok(result) = abi::decode(&ABI, "roots", data) {
        let _ = result.try_get::<Vec<[u8; 32]>>(0);
        let _ = result.try_get::<alloy_primitives::Bytes>(1);
    }
});
