//! Chain collaborators used by the resolver and readers.
//!
//! Each trait is a synchronous request/response primitive. Every
//! [`revm::DatabaseRef`] is a [`StorageReader`] and a [`CodeReader`], so the
//! same in-memory and forked databases used for execution can back storage
//! checks directly.

use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use alloy_rpc_types::TransactionRequest;
use revm::DatabaseRef;
use thiserror::Error;

/// Boxed collaborator error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raw 32-byte storage reads at `(address, slot)`.
pub trait StorageReader {
    type Error: std::error::Error + Send + Sync + 'static;

    fn storage_at(&self, address: Address, slot: U256) -> Result<B256, Self::Error>;
}

/// Read-only call execution returning the raw return data.
pub trait CallExecutor {
    type Error: std::error::Error + Send + Sync + 'static;

    fn call(&self, request: &TransactionRequest) -> Result<Bytes, Self::Error>;
}

/// Runtime bytecode lookup.
pub trait CodeReader {
    type Error: std::error::Error + Send + Sync + 'static;

    fn code_at(&self, address: Address) -> Result<Bytes, Self::Error>;
}

impl<DB> StorageReader for DB
where
    DB: DatabaseRef,
    DB::Error: Send + Sync + 'static,
{
    type Error = DB::Error;

    fn storage_at(&self, address: Address, slot: U256) -> Result<B256, Self::Error> {
        let value = self.storage_ref(address, slot)?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }
}

impl<DB> CodeReader for DB
where
    DB: DatabaseRef,
    DB::Error: Send + Sync + 'static,
{
    type Error = DB::Error;

    fn code_at(&self, address: Address) -> Result<Bytes, Self::Error> {
        let Some(info) = self.basic_ref(address)? else {
            return Ok(Bytes::new());
        };
        let code = match info.code {
            Some(code) => code,
            None => self.code_by_hash_ref(info.code_hash)?,
        };
        Ok(code.original_bytes())
    }
}

/// A collaborator failed while serving a request.
#[derive(Debug, Error)]
#[error("{operation} failed for {address}")]
pub struct RpcError {
    pub operation: &'static str,
    pub address: Address,
    #[source]
    pub source: BoxError,
}

impl RpcError {
    pub fn new(
        operation: &'static str,
        address: Address,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            operation,
            address,
            source: Box::new(source),
        }
    }
}
