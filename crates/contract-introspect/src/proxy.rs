//! Proxy classification and implementation resolution.
//!
//! Deployment names ending in `Proxy` denote a proxy in front of the
//! implementation named by the remaining prefix. The implementation address is
//! read from the EIP-1967 implementation slot, falling back to the legacy
//! address manager (`getAddress("OVM_<name>")`) when that slot is empty.

use std::sync::{
    Arc,
    LazyLock,
};

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{
    Address,
    B256,
    U256,
    b256,
};
use thiserror::Error;
use tracing::{
    debug,
    warn,
};

use crate::{
    abi::DecodingError,
    call::{
        CallError,
        ContractCall,
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

/// Suffix marking a deployment name as a proxy.
pub const PROXY_SUFFIX: &str = "Proxy";

/// Namespace prefix of implementation names in the legacy address manager.
pub const LEGACY_NAMESPACE: &str = "OVM_";

/// Address book entry of the legacy address manager.
pub const ADDRESS_MANAGER: &str = "AddressManager";

/// `keccak256("eip1967.proxy.implementation") - 1`
pub const EIP1967_IMPLEMENTATION_SLOT: B256 =
    b256!("0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

const ADDRESS_MANAGER_ABI: &str = r#"[{
    "type": "function",
    "name": "getAddress",
    "stateMutability": "view",
    "inputs": [{"name": "_name", "type": "string", "internalType": "string"}],
    "outputs": [{"name": "", "type": "address", "internalType": "address"}]
}]"#;

static ADDRESS_MANAGER_INTERFACE: LazyLock<Arc<JsonAbi>> = LazyLock::new(|| {
    Arc::new(serde_json::from_str(ADDRESS_MANAGER_ABI).expect("address manager ABI is valid"))
});

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown contract: {0}")]
    UnknownContract(#[from] RegistryError),
    #[error("proxy `{proxy}` has no implementation in the EIP-1967 slot or the legacy address manager")]
    UnresolvedProxy { proxy: String },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("legacy address manager lookup failed: {0}")]
    Call(#[from] CallError),
}

/// A deployment name, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalName {
    Direct { name: String },
    Proxied { proxy: String, implementation: String },
}

impl LogicalName {
    pub fn parse(name: &str) -> Self {
        match name.strip_suffix(PROXY_SUFFIX) {
            Some(implementation) if !implementation.is_empty() => Self::Proxied {
                proxy: name.to_string(),
                implementation: implementation.to_string(),
            },
            _ => Self::Direct {
                name: name.to_string(),
            },
        }
    }

    /// The deployment name as written.
    pub fn name(&self) -> &str {
        match self {
            Self::Direct { name } => name,
            Self::Proxied { proxy, .. } => proxy,
        }
    }

    /// Name of the contract whose artifacts describe the code and layout.
    pub fn implementation_name(&self) -> &str {
        match self {
            Self::Direct { name } => name,
            Self::Proxied { implementation, .. } => implementation,
        }
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self, Self::Proxied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    Eip1967,
    LegacyAddressManager,
}

/// A proxy and the implementation it currently delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyBinding {
    pub proxy: Address,
    pub implementation: Address,
    pub strategy: ResolutionStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedContract {
    Direct(Address),
    Proxied(ProxyBinding),
}

impl ResolvedContract {
    /// Address whose storage holds the contract state. Proxies keep state in
    /// their own storage.
    pub fn storage_address(&self) -> Address {
        match self {
            Self::Direct(address) => *address,
            Self::Proxied(binding) => binding.proxy,
        }
    }

    /// Address of the executing code.
    pub fn code_address(&self) -> Address {
        match self {
            Self::Direct(address) => *address,
            Self::Proxied(binding) => binding.implementation,
        }
    }
}

pub struct ProxyResolver<'a, C> {
    registry: &'a ArtifactRegistry,
    chain: &'a C,
}

impl<'a, C> ProxyResolver<'a, C>
where
    C: StorageReader + CallExecutor,
{
    pub fn new(registry: &'a ArtifactRegistry, chain: &'a C) -> Self {
        Self { registry, chain }
    }

    pub fn resolve(&self, name: &LogicalName) -> Result<ResolvedContract, ResolveError> {
        match name {
            LogicalName::Direct { name } => Ok(ResolvedContract::Direct(self.registry.address(name)?)),
            LogicalName::Proxied {
                proxy,
                implementation,
            } => {
                let proxy_address = self.registry.address(proxy)?;
                self.resolve_proxy(proxy, implementation, proxy_address)
                    .map(ResolvedContract::Proxied)
            }
        }
    }

    /// Shorthand for [`ProxyResolver::resolve`] on an unclassified name.
    pub fn resolve_name(&self, name: &str) -> Result<ResolvedContract, ResolveError> {
        self.resolve(&LogicalName::parse(name))
    }

    fn resolve_proxy(
        &self,
        proxy: &str,
        implementation: &str,
        proxy_address: Address,
    ) -> Result<ProxyBinding, ResolveError> {
        let word = self
            .chain
            .storage_at(
                proxy_address,
                U256::from_be_bytes(EIP1967_IMPLEMENTATION_SLOT.0),
            )
            .map_err(|err| RpcError::new("eth_getStorageAt", proxy_address, err))?;
        let slot_implementation = Address::from_word(word);

        if !slot_implementation.is_zero() {
            debug!(
                target = "contract_introspect::proxy",
                proxy,
                %proxy_address,
                implementation = %slot_implementation,
                "Resolved proxy via EIP-1967 slot"
            );
            return Ok(ProxyBinding {
                proxy: proxy_address,
                implementation: slot_implementation,
                strategy: ResolutionStrategy::Eip1967,
            });
        }

        let legacy_implementation = self.legacy_lookup(proxy, implementation)?;
        if legacy_implementation.is_zero() {
            return Err(ResolveError::UnresolvedProxy {
                proxy: proxy.to_string(),
            });
        }

        debug!(
            target = "contract_introspect::proxy",
            proxy,
            %proxy_address,
            implementation = %legacy_implementation,
            "Resolved proxy via legacy address manager"
        );
        Ok(ProxyBinding {
            proxy: proxy_address,
            implementation: legacy_implementation,
            strategy: ResolutionStrategy::LegacyAddressManager,
        })
    }

    fn legacy_lookup(&self, proxy: &str, implementation: &str) -> Result<Address, ResolveError> {
        let Ok(manager) = self.registry.address(ADDRESS_MANAGER) else {
            warn!(
                target = "contract_introspect::proxy",
                proxy,
                "EIP-1967 slot is empty and no address manager is registered"
            );
            return Ok(Address::ZERO);
        };

        let legacy_name = format!("{LEGACY_NAMESPACE}{implementation}");
        let call = ContractCall::new(
            ADDRESS_MANAGER_INTERFACE.clone(),
            manager,
            "getAddress",
            vec![DynSolValue::String(legacy_name)],
        );
        match call.execute(self.chain) {
            Ok(result) => Ok(result.get_address(0)),
            // eth_call to an address without code returns no data
            Err(CallError::Unpack(DecodingError::EmptyReturnData(_))) => {
                warn!(
                    target = "contract_introspect::proxy",
                    proxy,
                    %manager,
                    "Address manager returned no data"
                );
                Ok(Address::ZERO)
            }
            Err(err) => Err(err.into()),
        }
    }
}
