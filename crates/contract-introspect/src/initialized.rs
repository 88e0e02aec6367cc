//! Post-deployment checks of the `_initialized` counter.
//!
//! Upgradeable contracts record how far their initializer has run in a
//! `uint8 _initialized` variable, usually packed after an address in slot 0.
//! The counter of a proxied contract lives in the proxy's storage, laid out
//! according to the implementation's storage layout.

use alloy_primitives::Address;
use serde::Serialize;
use thiserror::Error;
use tracing::{
    debug,
    warn,
};

use crate::{
    layout::LayoutError,
    proxy::{
        LogicalName,
        ProxyResolver,
        ResolveError,
        ResolvedContract,
    },
    registry::{
        ArtifactRegistry,
        RegistryError,
    },
    rpc::{
        CallExecutor,
        RpcError,
        StorageReader,
    },
};

pub const INITIALIZED_LABEL: &str = "_initialized";
pub const INITIALIZED_TYPE: &str = "t_uint8";

#[derive(Debug, Error)]
pub enum InitializedError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("no storage layout for `{name}`: {source}")]
    MissingLayout {
        name: String,
        #[source]
        source: RegistryError,
    },
    #[error("`{contract}` has no `_initialized` variable of type uint8")]
    SlotNotFound { contract: String },
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Outcome of one counter read, as reported by batch checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializedReport {
    pub name: String,
    /// Address whose storage was read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialized: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitializedReport {
    pub fn is_initialized(&self) -> bool {
        self.initialized.is_some_and(|value| value > 0)
    }
}

pub struct InitializedReader<'a, C> {
    registry: &'a ArtifactRegistry,
    chain: &'a C,
}

impl<'a, C> InitializedReader<'a, C>
where
    C: StorageReader + CallExecutor,
{
    pub fn new(registry: &'a ArtifactRegistry, chain: &'a C) -> Self {
        Self { registry, chain }
    }

    /// Reads the `_initialized` counter of deployment `name`.
    ///
    /// `FooProxy` reads the proxy's storage using `Foo`'s layout.
    pub fn read_initialized_counter(&self, name: &str) -> Result<u8, InitializedError> {
        self.read(&LogicalName::parse(name)).map(|(_, value)| value)
    }

    /// Reads every counter in `names`, reporting failures per name.
    pub fn read_initialized_many<'n, I>(&self, names: I) -> Vec<InitializedReport>
    where
        I: IntoIterator<Item = &'n str>,
    {
        names
            .into_iter()
            .map(|name| {
                match self.read(&LogicalName::parse(name)) {
                    Ok((resolved, value)) => {
                        InitializedReport {
                            name: name.to_string(),
                            address: Some(resolved.storage_address()),
                            initialized: Some(value),
                            error: None,
                        }
                    }
                    Err(err) => {
                        warn!(
                            target = "contract_introspect::initialized",
                            name,
                            error = %err,
                            "Failed to read initialized counter"
                        );
                        InitializedReport {
                            name: name.to_string(),
                            address: None,
                            initialized: None,
                            error: Some(err.to_string()),
                        }
                    }
                }
            })
            .collect()
    }

    fn read(&self, name: &LogicalName) -> Result<(ResolvedContract, u8), InitializedError> {
        let resolved = ProxyResolver::new(self.registry, self.chain).resolve(name)?;

        let contract = name.implementation_name();
        let layout = self.registry.storage_layout(contract).map_err(|source| {
            InitializedError::MissingLayout {
                name: contract.to_string(),
                source,
            }
        })?;
        let slot = layout
            .find_slot(INITIALIZED_LABEL, INITIALIZED_TYPE)
            .ok_or_else(|| {
                InitializedError::SlotNotFound {
                    contract: contract.to_string(),
                }
            })?;

        let address = resolved.storage_address();
        let index = slot.slot_index()?;
        let word = self
            .chain
            .storage_at(address, index)
            .map_err(|err| RpcError::new("eth_getStorageAt", address, err))?;
        // uint8 occupies exactly one byte of the word
        let value = slot.extract(word, 1).to::<u8>();

        debug!(
            target = "contract_introspect::initialized",
            name = name.name(),
            %address,
            slot = %index,
            offset = slot.offset,
            value,
            "Read initialized counter"
        );
        Ok((resolved, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::StorageLayout,
        proxy::EIP1967_IMPLEMENTATION_SLOT,
        registry::ContractArtifact,
    };
    use alloy_primitives::{
        B256,
        Bytes,
        U256,
    };
    use alloy_rpc_types::TransactionRequest;
    use assert_matches::assert_matches;
    use revm::database::InMemoryDB;
    use std::convert::Infallible;

    const MESSENGER: Address = Address::repeat_byte(0x11);
    const PROXY: Address = Address::repeat_byte(0x22);
    const IMPLEMENTATION: Address = Address::repeat_byte(0x33);

    const MESSENGER_LAYOUT: &str = r#"{
        "storage": [
            {"astId":1000,"contract":"src/L1/L1CrossDomainMessenger.sol:L1CrossDomainMessenger","label":"spacer_0_0_20","offset":0,"slot":"0","type":"t_address"},
            {"astId":1001,"contract":"src/L1/L1CrossDomainMessenger.sol:L1CrossDomainMessenger","label":"_initialized","offset":20,"slot":"0","type":"t_uint8"},
            {"astId":1002,"contract":"src/L1/L1CrossDomainMessenger.sol:L1CrossDomainMessenger","label":"_initializing","offset":21,"slot":"0","type":"t_bool"}
        ],
        "types": {
            "t_address":{"encoding":"inplace","label":"address","numberOfBytes":"20"},
            "t_bool":{"encoding":"inplace","label":"bool","numberOfBytes":"1"},
            "t_uint8":{"encoding":"inplace","label":"uint8","numberOfBytes":"1"}
        }
    }"#;

    /// Storage-only chain; the legacy lookup is never reached in these tests.
    #[derive(Default)]
    struct StorageOnly(InMemoryDB);

    impl StorageReader for StorageOnly {
        type Error = Infallible;

        fn storage_at(&self, address: Address, slot: U256) -> Result<B256, Self::Error> {
            self.0.storage_at(address, slot)
        }
    }

    impl CallExecutor for StorageOnly {
        type Error = Infallible;

        fn call(&self, _request: &TransactionRequest) -> Result<Bytes, Self::Error> {
            panic!("unexpected eth_call")
        }
    }

    impl StorageOnly {
        fn set(&mut self, address: Address, slot: U256, word: B256) {
            self.0
                .insert_account_storage(address, slot, U256::from_be_bytes(word.0))
                .unwrap();
        }
    }

    fn slot_zero_word(initialized: u8) -> B256 {
        let mut word = B256::ZERO;
        // spacer address in bytes [0, 20), counter at 20, `_initializing` at 21
        word[12..32].fill(0xEE);
        word[31 - 20] = initialized;
        word[31 - 21] = 1;
        word
    }

    fn registry() -> ArtifactRegistry {
        let mut registry = ArtifactRegistry::new();
        registry.insert_artifact(
            "L1CrossDomainMessenger",
            ContractArtifact::new(StorageLayout::parse(MESSENGER_LAYOUT).unwrap()),
        );
        registry.insert_address("L1CrossDomainMessenger", MESSENGER);
        registry.insert_address("L1CrossDomainMessengerProxy", PROXY);
        registry
    }

    #[test]
    fn reads_packed_counter_of_direct_contract() {
        let registry = registry();
        let mut chain = StorageOnly::default();
        chain.set(MESSENGER, U256::ZERO, slot_zero_word(1));

        let reader = InitializedReader::new(&registry, &chain);
        assert_eq!(
            reader
                .read_initialized_counter("L1CrossDomainMessenger")
                .unwrap(),
            1
        );
    }

    #[test]
    fn proxied_counter_is_read_from_proxy_storage() {
        let registry = registry();
        let mut chain = StorageOnly::default();
        chain.set(
            PROXY,
            U256::from_be_bytes(EIP1967_IMPLEMENTATION_SLOT.0),
            IMPLEMENTATION.into_word(),
        );
        chain.set(PROXY, U256::ZERO, slot_zero_word(3));
        chain.set(IMPLEMENTATION, U256::ZERO, slot_zero_word(255));

        let reader = InitializedReader::new(&registry, &chain);
        assert_eq!(
            reader
                .read_initialized_counter("L1CrossDomainMessengerProxy")
                .unwrap(),
            3
        );
    }

    #[test]
    fn untouched_storage_reads_zero() {
        let registry = registry();
        let chain = StorageOnly::default();

        let reader = InitializedReader::new(&registry, &chain);
        assert_eq!(
            reader
                .read_initialized_counter("L1CrossDomainMessenger")
                .unwrap(),
            0
        );
    }

    #[test]
    fn layout_without_counter_is_slot_not_found() {
        let mut registry = ArtifactRegistry::new();
        let layout = StorageLayout::parse(
            r#"{"storage":[{"astId":1,"contract":"src/Owned.sol:Owned","label":"owner","offset":0,"slot":"0","type":"t_address"}],
                "types":{"t_address":{"encoding":"inplace","label":"address","numberOfBytes":"20"}}}"#,
        )
        .unwrap();
        assert!(layout.find_slot(INITIALIZED_LABEL, INITIALIZED_TYPE).is_none());
        registry.insert_artifact("Owned", ContractArtifact::new(layout));
        registry.insert_address("Owned", MESSENGER);
        let chain = StorageOnly::default();

        let reader = InitializedReader::new(&registry, &chain);
        assert_matches!(
            reader.read_initialized_counter("Owned"),
            Err(InitializedError::SlotNotFound { contract }) if contract == "Owned"
        );
    }

    #[test]
    fn missing_layout_names_implementation() {
        let mut registry = ArtifactRegistry::new();
        registry.insert_address("OptimismPortal", MESSENGER);
        let chain = StorageOnly::default();

        let reader = InitializedReader::new(&registry, &chain);
        assert_matches!(
            reader.read_initialized_counter("OptimismPortal"),
            Err(InitializedError::MissingLayout { name, .. }) if name == "OptimismPortal"
        );
    }

    #[test]
    fn unknown_address_fails_resolution() {
        let registry = registry();
        let chain = StorageOnly::default();

        let reader = InitializedReader::new(&registry, &chain);
        assert_matches!(
            reader.read_initialized_counter("SystemConfig"),
            Err(InitializedError::Resolve(ResolveError::UnknownContract(_)))
        );
    }

    #[test]
    fn batch_reports_each_name() {
        let registry = registry();
        let mut chain = StorageOnly::default();
        chain.set(MESSENGER, U256::ZERO, slot_zero_word(1));

        let reader = InitializedReader::new(&registry, &chain);
        let reports = reader.read_initialized_many(["L1CrossDomainMessenger", "SystemConfig"]);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].address, Some(MESSENGER));
        assert_eq!(reports[0].initialized, Some(1));
        assert!(reports[0].is_initialized());
        assert_eq!(reports[1].name, "SystemConfig");
        assert!(!reports[1].is_initialized());
        assert!(reports[1].error.as_deref().unwrap().contains("SystemConfig"));

        let json = serde_json::to_value(&reports[1]).unwrap();
        assert!(json.get("initialized").is_none());
    }
}
