//! End-to-end counter checks against a compiler-emitted layout.

use std::{
    cell::Cell,
    convert::Infallible,
};

use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{
    SolCall,
    SolValue,
    sol,
};
use contract_introspect::{
    ArtifactRegistry,
    CallExecutor,
    InitializedReader,
    LogicalName,
    ProxyResolver,
    ResolutionStrategy,
    ResolvedContract,
    StorageLayout,
    StorageReader,
    proxy::EIP1967_IMPLEMENTATION_SLOT,
};
use revm::database::InMemoryDB;
use serde_json::json;

sol! {
    interface IAddressManager {
        function getAddress(string _name) external view returns (address);
    }
}

const LAYOUT: &str = include_str!("fixtures/l1_cross_domain_messenger_layout.json");

const MANAGER: Address = Address::repeat_byte(0x0A);
const MESSENGER_PROXY: Address = Address::repeat_byte(0x0B);
const PORTAL_PROXY: Address = Address::repeat_byte(0x0C);
const MESSENGER_IMPL: Address = Address::repeat_byte(0x1B);
const PORTAL_IMPL: Address = Address::repeat_byte(0x1C);

/// In-memory chain with a legacy address manager answering `getAddress`.
struct Chain {
    db: InMemoryDB,
    manager_calls: Cell<usize>,
}

impl Chain {
    fn new() -> Self {
        Self {
            db: InMemoryDB::default(),
            manager_calls: Cell::new(0),
        }
    }

    fn store(&mut self, address: Address, slot: U256, word: B256) {
        self.db
            .insert_account_storage(address, slot, U256::from_be_bytes(word.0))
            .unwrap();
    }
}

impl StorageReader for Chain {
    type Error = Infallible;

    fn storage_at(&self, address: Address, slot: U256) -> Result<B256, Self::Error> {
        self.db.storage_at(address, slot)
    }
}

impl CallExecutor for Chain {
    type Error = Infallible;

    fn call(&self, request: &TransactionRequest) -> Result<Bytes, Self::Error> {
        self.manager_calls.set(self.manager_calls.get() + 1);
        let input = request.input.input().cloned().unwrap_or_default();
        let call = IAddressManager::getAddressCall::abi_decode(&input).unwrap();
        let implementation = match call._name.as_str() {
            "OVM_L1CrossDomainMessenger" => MESSENGER_IMPL,
            _ => Address::ZERO,
        };
        Ok(implementation.abi_encode().into())
    }
}

fn registry() -> ArtifactRegistry {
    let layout: serde_json::Value = serde_json::from_str(LAYOUT).unwrap();
    let bundle = json!({
        "addresses": {
            "AddressManager": MANAGER,
            "L1CrossDomainMessengerProxy": MESSENGER_PROXY,
            "OptimismPortalProxy": PORTAL_PROXY,
        },
        "contracts": {
            "L1CrossDomainMessenger": { "storageLayout": layout.clone() },
            "OptimismPortal": { "storageLayout": layout },
        }
    });
    ArtifactRegistry::from_bundle_json(&bundle.to_string()).unwrap()
}

fn slot_zero(initialized: u8) -> B256 {
    let mut word = B256::ZERO;
    word[31 - 20] = initialized;
    word
}

#[test]
fn fixture_layout_places_counter_after_spacer() {
    let layout = StorageLayout::parse(LAYOUT).unwrap();
    let slot = layout.find_slot("_initialized", "t_uint8").unwrap();

    assert_eq!(slot.slot, "0");
    assert_eq!(slot.offset, 20);
    assert_eq!(layout.type_width(&slot.type_tag), Some(1));
    assert_eq!(layout.find_label("msgNonce").unwrap().type_tag, "t_uint240");
}

#[test]
fn legacy_proxy_counter_is_read_through_address_manager() {
    let registry = registry();
    let mut chain = Chain::new();
    chain.store(MESSENGER_PROXY, U256::ZERO, slot_zero(1));

    let resolved = ProxyResolver::new(&registry, &chain)
        .resolve(&LogicalName::parse("L1CrossDomainMessengerProxy"))
        .unwrap();
    let ResolvedContract::Proxied(binding) = resolved else {
        panic!("expected a proxied contract, got {resolved:?}");
    };
    assert_eq!(binding.implementation, MESSENGER_IMPL);
    assert_eq!(binding.strategy, ResolutionStrategy::LegacyAddressManager);

    let reader = InitializedReader::new(&registry, &chain);
    assert_eq!(
        reader
            .read_initialized_counter("L1CrossDomainMessengerProxy")
            .unwrap(),
        1
    );
}

#[test]
fn eip1967_proxy_skips_address_manager() {
    let registry = registry();
    let mut chain = Chain::new();
    chain.store(
        PORTAL_PROXY,
        U256::from_be_bytes(EIP1967_IMPLEMENTATION_SLOT.0),
        PORTAL_IMPL.into_word(),
    );
    chain.store(PORTAL_PROXY, U256::ZERO, slot_zero(2));

    let reader = InitializedReader::new(&registry, &chain);
    let reports = reader.read_initialized_many(["OptimismPortalProxy"]);

    assert_eq!(reports[0].address, Some(PORTAL_PROXY));
    assert_eq!(reports[0].initialized, Some(2));
    assert_eq!(chain.manager_calls.get(), 0);
}

#[test]
fn unresolvable_proxy_is_reported_not_read() {
    let mut registry = registry();
    registry.insert_address("L2OutputOracleProxy", Address::repeat_byte(0x0D));
    let chain = Chain::new();

    let reader = InitializedReader::new(&registry, &chain);
    let reports = reader.read_initialized_many(["L2OutputOracleProxy"]);

    assert_eq!(reports[0].initialized, None);
    assert!(
        reports[0]
            .error
            .as_deref()
            .unwrap()
            .contains("L2OutputOracleProxy")
    );
    assert_eq!(chain.manager_calls.get(), 1);
}
