//! Compiler artifacts and deployment addresses for one verification run.
//!
//! The registry is built once from the artifact collaborator and passed by
//! reference to the resolver and readers. It holds, per contract name, the
//! storage layout, deployed bytecode and immutable reference table, plus an
//! address book mapping deployment names (including `*Proxy` names) to
//! addresses.

use std::{
    collections::BTreeMap,
    sync::Arc,
};

use alloy_json_abi::JsonAbi;
use alloy_primitives::{
    Address,
    Bytes,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::layout::{
    LayoutError,
    StorageLayout,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no artifact registered for `{0}`")]
    MissingArtifact(String),
    #[error("no deployment address registered for `{0}`")]
    MissingAddress(String),
    #[error("invalid artifact bundle: {0}")]
    Bundle(#[from] serde_json::Error),
    #[error("invalid storage layout for `{name}`: {source}")]
    Layout {
        name: String,
        #[source]
        source: LayoutError,
    },
    #[error("immutable reference {start}+{length} is outside the bytecode of `{name}`")]
    ImmutableOutOfBounds {
        name: String,
        start: usize,
        length: usize,
    },
}

/// Byte range of an immutable value inside deployed bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ImmutableReference {
    pub start: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub abi: Arc<JsonAbi>,
    pub storage_layout: StorageLayout,
    pub deployed_bytecode: Bytes,
    /// Keyed by the AST id of the immutable variable.
    pub immutable_references: BTreeMap<String, Vec<ImmutableReference>>,
}

impl ContractArtifact {
    pub fn new(storage_layout: StorageLayout) -> Self {
        Self {
            abi: Arc::default(),
            storage_layout,
            deployed_bytecode: Bytes::new(),
            immutable_references: BTreeMap::new(),
        }
    }

    pub fn with_abi(mut self, abi: JsonAbi) -> Self {
        self.abi = Arc::new(abi);
        self
    }

    pub fn with_deployed_bytecode(mut self, deployed_bytecode: Bytes) -> Self {
        self.deployed_bytecode = deployed_bytecode;
        self
    }

    pub fn with_immutable_references(
        mut self,
        immutable_references: BTreeMap<String, Vec<ImmutableReference>>,
    ) -> Self {
        self.immutable_references = immutable_references;
        self
    }

    fn immutable_ranges(&self) -> impl Iterator<Item = &ImmutableReference> {
        self.immutable_references.values().flatten()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleArtifact {
    #[serde(default)]
    abi: JsonAbi,
    storage_layout: serde_json::Value,
    #[serde(default)]
    deployed_bytecode: Bytes,
    #[serde(default)]
    immutable_references: BTreeMap<String, Vec<ImmutableReference>>,
}

#[derive(Debug, Deserialize)]
struct Bundle {
    #[serde(default)]
    addresses: BTreeMap<String, Address>,
    #[serde(default)]
    contracts: BTreeMap<String, BundleArtifact>,
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    artifacts: BTreeMap<String, ContractArtifact>,
    addresses: BTreeMap<String, Address>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a bundle document:
    ///
    /// ```json
    /// {
    ///   "addresses": { "L1CrossDomainMessengerProxy": "0x..." },
    ///   "contracts": {
    ///     "L1CrossDomainMessenger": {
    ///       "abi": [],
    ///       "storageLayout": { "storage": [], "types": {} },
    ///       "deployedBytecode": "0x...",
    ///       "immutableReferences": { "73451": [{ "start": 446, "length": 32 }] }
    ///     }
    ///   }
    /// }
    /// ```
    pub fn from_bundle_json(json: &str) -> Result<Self, RegistryError> {
        let bundle: Bundle = serde_json::from_str(json)?;
        let mut registry = Self::new();

        for (name, artifact) in bundle.contracts {
            let storage_layout = StorageLayout::from_value(artifact.storage_layout).map_err(
                |source| {
                    RegistryError::Layout {
                        name: name.clone(),
                        source,
                    }
                },
            )?;
            let artifact = ContractArtifact::new(storage_layout)
                .with_abi(artifact.abi)
                .with_deployed_bytecode(artifact.deployed_bytecode)
                .with_immutable_references(artifact.immutable_references);
            registry.insert_artifact(name, artifact);
        }
        for (name, address) in bundle.addresses {
            registry.insert_address(name, address);
        }

        debug!(
            target = "contract_introspect::registry",
            artifacts = registry.artifacts.len(),
            addresses = registry.addresses.len(),
            "Loaded artifact bundle"
        );
        Ok(registry)
    }

    pub fn insert_artifact(&mut self, name: impl Into<String>, artifact: ContractArtifact) {
        self.artifacts.insert(name.into(), artifact);
    }

    pub fn insert_address(&mut self, name: impl Into<String>, address: Address) {
        self.addresses.insert(name.into(), address);
    }

    pub fn artifact(&self, name: &str) -> Result<&ContractArtifact, RegistryError> {
        self.artifacts
            .get(name)
            .ok_or_else(|| RegistryError::MissingArtifact(name.to_string()))
    }

    pub fn abi(&self, name: &str) -> Result<Arc<JsonAbi>, RegistryError> {
        Ok(self.artifact(name)?.abi.clone())
    }

    pub fn storage_layout(&self, name: &str) -> Result<&StorageLayout, RegistryError> {
        Ok(&self.artifact(name)?.storage_layout)
    }

    pub fn deployed_bytecode(&self, name: &str) -> Result<&Bytes, RegistryError> {
        Ok(&self.artifact(name)?.deployed_bytecode)
    }

    pub fn immutable_references(
        &self,
        name: &str,
    ) -> Result<&BTreeMap<String, Vec<ImmutableReference>>, RegistryError> {
        Ok(&self.artifact(name)?.immutable_references)
    }

    pub fn address(&self, name: &str) -> Result<Address, RegistryError> {
        self.addresses
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::MissingAddress(name.to_string()))
    }

    pub fn artifact_names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn deployment_names(&self) -> impl Iterator<Item = &str> {
        self.addresses.keys().map(String::as_str)
    }

    /// Compares `onchain` runtime code with the registered deployed bytecode.
    ///
    /// Immutable values are linked in at deployment, so every immutable range
    /// is zeroed on both sides before comparing.
    pub fn deployed_bytecode_matches(
        &self,
        name: &str,
        onchain: &[u8],
    ) -> Result<bool, RegistryError> {
        let artifact = self.artifact(name)?;
        let expected = &artifact.deployed_bytecode;
        if expected.len() != onchain.len() {
            debug!(
                target = "contract_introspect::registry",
                name,
                expected = expected.len(),
                actual = onchain.len(),
                "Deployed bytecode length differs"
            );
            return Ok(false);
        }

        let mut expected = expected.to_vec();
        let mut actual = onchain.to_vec();
        for reference in artifact.immutable_ranges() {
            let end = reference
                .start
                .checked_add(reference.length)
                .filter(|end| *end <= expected.len())
                .ok_or_else(|| {
                    RegistryError::ImmutableOutOfBounds {
                        name: name.to_string(),
                        start: reference.start,
                        length: reference.length,
                    }
                })?;
            expected[reference.start..end].fill(0);
            actual[reference.start..end].fill(0);
        }
        Ok(expected == actual)
    }
}
