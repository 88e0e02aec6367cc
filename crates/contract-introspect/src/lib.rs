//! Typed contract calls and on-chain state introspection.
//!
//! The crate builds ABI-encoded calls, decodes their results, models compiler
//! storage layouts and resolves proxied contracts to their implementation so
//! that internal state such as the `_initialized` counter can be verified after
//! a deployment. It performs no I/O itself: chain access goes through the
//! [`StorageReader`], [`CallExecutor`] and [`CodeReader`] collaborators.

pub mod abi;
pub use abi::{
    CallResult,
    DecodingError,
    EncodingError,
    FromDynValue,
};

pub mod call;
pub use call::{
    CallError,
    ContractCall,
    TxCandidate,
};

pub mod layout;
pub use layout::{
    LayoutError,
    StorageLayout,
    StorageSlot,
    StorageType,
};

pub mod registry;
pub use registry::{
    ArtifactRegistry,
    ContractArtifact,
    ImmutableReference,
    RegistryError,
};

pub mod proxy;
pub use proxy::{
    LogicalName,
    ProxyBinding,
    ProxyResolver,
    ResolutionStrategy,
    ResolveError,
    ResolvedContract,
};

pub mod initialized;
pub use initialized::{
    InitializedError,
    InitializedReader,
    InitializedReport,
};

pub mod rpc;
pub use rpc::{
    CallExecutor,
    CodeReader,
    RpcError,
    StorageReader,
};
