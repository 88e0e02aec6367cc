//! Reusable contract call descriptors.
//!
//! A [`ContractCall`] captures the ABI, target, method and positional arguments
//! of one call. It can be packed into call data, projected into a read-only
//! request or a [`TxCandidate`], and used to decode the matching return data.

use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{
    Address,
    Bytes,
};
use alloy_rpc_types::{
    TransactionInput,
    TransactionRequest,
};
use thiserror::Error;
use tracing::trace;

use crate::{
    abi::{
        self,
        CallResult,
        DecodingError,
        EncodingError,
    },
    rpc::{
        CallExecutor,
        RpcError,
    },
};

#[derive(Debug, Error)]
pub enum CallError {
    #[error("failed to pack arguments: {0}")]
    Pack(#[from] EncodingError),
    #[error("failed to unpack data: {0}")]
    Unpack(#[from] DecodingError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Recipient and call data handed to a transaction submitter.
///
/// Gas, nonce, value and signing belong to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCandidate {
    pub to: Address,
    pub data: Bytes,
}

impl From<TxCandidate> for TransactionRequest {
    fn from(candidate: TxCandidate) -> Self {
        TransactionRequest::default()
            .to(candidate.to)
            .input(TransactionInput::new(candidate.data))
    }
}

#[derive(Debug, Clone)]
pub struct ContractCall {
    abi: Arc<JsonAbi>,
    address: Address,
    method: String,
    args: Vec<DynSolValue>,
    from: Option<Address>,
}

impl ContractCall {
    /// Builds a call. Arguments are validated against the ABI when packed.
    pub fn new(
        abi: Arc<JsonAbi>,
        address: Address,
        method: impl Into<String>,
        args: Vec<DynSolValue>,
    ) -> Self {
        Self {
            abi,
            address,
            method: method.into(),
            args,
            from: None,
        }
    }

    /// Sets the sender used by [`ContractCall::to_read_request`].
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[DynSolValue] {
        &self.args
    }

    pub fn sender(&self) -> Option<Address> {
        self.from
    }

    pub fn pack(&self) -> Result<Bytes, EncodingError> {
        abi::encode(&self.abi, &self.method, &self.args)
    }

    /// Read-only request `{from, to, input}`; `from` is the zero address
    /// unless set.
    pub fn to_read_request(&self) -> Result<TransactionRequest, CallError> {
        let data = self.pack()?;
        Ok(TransactionRequest::default()
            .from(self.from.unwrap_or(Address::ZERO))
            .to(self.address)
            .input(TransactionInput::new(data)))
    }

    pub fn to_tx_candidate(&self) -> Result<TxCandidate, CallError> {
        Ok(TxCandidate {
            to: self.address,
            data: self.pack()?,
        })
    }

    /// Decodes return data with this call's method signature.
    pub fn unpack(&self, data: &[u8]) -> Result<CallResult, DecodingError> {
        match abi::select_function(&self.abi, &self.method, &self.args) {
            Ok(function) => abi::decode_output(function, data),
            Err(_) => abi::decode(&self.abi, &self.method, data),
        }
    }

    /// Runs the call through `executor` and decodes the result.
    pub fn execute<E: CallExecutor>(&self, executor: &E) -> Result<CallResult, CallError> {
        let request = self.to_read_request()?;
        trace!(
            target = "contract_introspect::call",
            to = %self.address,
            method = %self.method,
            "Executing read-only call"
        );
        let data = executor
            .call(&request)
            .map_err(|err| RpcError::new("eth_call", self.address, err))?;
        Ok(self.unpack(&data)?)
    }
}
