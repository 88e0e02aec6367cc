//! Per-contract checks run by the binary.

use alloy::dyn_abi::DynSolValue;
use contract_introspect::{
    ArtifactRegistry,
    CallError,
    CallExecutor,
    CodeReader,
    ContractCall,
    EncodingError,
    InitializedReader,
    InitializedReport,
    LogicalName,
    ProxyResolver,
    RegistryError,
    ResolveError,
    RpcError,
    StorageReader,
    abi::coerce_args,
    initialized::{
        INITIALIZED_LABEL,
        INITIALIZED_TYPE,
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{
    debug,
    warn,
};

use crate::cli::CallTarget;

#[derive(Debug, Error)]
pub enum CodeCheckError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[derive(Debug, Error)]
pub enum ReadCallError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("`{name}` has no method `{method}` taking {arity} arguments")]
    NoMatchingMethod {
        name: String,
        method: String,
        arity: usize,
    },
    #[error("invalid arguments: {0}")]
    Arguments(#[from] EncodingError),
    #[error(transparent)]
    Call(#[from] CallError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallReport {
    pub call: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractCheck {
    #[serde(flatten)]
    pub initialized: InitializedReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_matches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_error: Option<String>,
}

impl ContractCheck {
    pub fn passed(&self) -> bool {
        self.initialized.is_initialized()
            && self.code_error.is_none()
            && self.code_matches.unwrap_or(true)
    }
}

/// Deployments whose implementation layout declares the `_initialized` counter.
pub fn default_targets(registry: &ArtifactRegistry) -> Vec<String> {
    registry
        .deployment_names()
        .filter(|name| {
            let logical = LogicalName::parse(name);
            registry
                .storage_layout(logical.implementation_name())
                .is_ok_and(|layout| layout.find_slot(INITIALIZED_LABEL, INITIALIZED_TYPE).is_some())
        })
        .map(str::to_string)
        .collect()
}

pub fn run<C>(
    registry: &ArtifactRegistry,
    chain: &C,
    names: &[String],
    check_code: bool,
) -> Vec<ContractCheck>
where
    C: StorageReader + CallExecutor + CodeReader,
{
    let reader = InitializedReader::new(registry, chain);
    reader
        .read_initialized_many(names.iter().map(String::as_str))
        .into_iter()
        .map(|initialized| {
            let mut check = ContractCheck {
                initialized,
                code_matches: None,
                code_error: None,
            };
            if check_code {
                match code_matches(registry, chain, &check.initialized.name) {
                    Ok(matches) => check.code_matches = Some(matches),
                    Err(err) => {
                        warn!(
                            target = "init_checker::check",
                            name = %check.initialized.name,
                            error = %err,
                            "Failed to compare deployed code"
                        );
                        check.code_error = Some(err.to_string());
                    }
                }
            }
            check
        })
        .collect()
}

/// Compares the code executing behind `name` with its bundled artifact.
pub fn code_matches<C>(
    registry: &ArtifactRegistry,
    chain: &C,
    name: &str,
) -> Result<bool, CodeCheckError>
where
    C: StorageReader + CallExecutor + CodeReader,
{
    let logical = LogicalName::parse(name);
    let resolved = ProxyResolver::new(registry, chain).resolve(&logical)?;
    let address = resolved.code_address();
    let code = chain
        .code_at(address)
        .map_err(|err| RpcError::new("eth_getCode", address, err))?;

    let matches = registry.deployed_bytecode_matches(logical.implementation_name(), &code)?;
    debug!(
        target = "init_checker::check",
        name,
        %address,
        matches,
        "Compared deployed code"
    );
    Ok(matches)
}

pub fn run_calls<C>(registry: &ArtifactRegistry, chain: &C, targets: &[CallTarget]) -> Vec<CallReport>
where
    C: StorageReader + CallExecutor,
{
    targets
        .iter()
        .map(|target| {
            match read_call(registry, chain, target) {
                Ok(outputs) => {
                    CallReport {
                        call: target.to_string(),
                        outputs: Some(outputs),
                        error: None,
                    }
                }
                Err(err) => {
                    warn!(
                        target = "init_checker::check",
                        call = %target,
                        error = %err,
                        "Read call failed"
                    );
                    CallReport {
                        call: target.to_string(),
                        outputs: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}

/// Runs one ad-hoc read against the address holding the contract state and
/// renders each output.
pub fn read_call<C>(
    registry: &ArtifactRegistry,
    chain: &C,
    target: &CallTarget,
) -> Result<Vec<String>, ReadCallError>
where
    C: StorageReader + CallExecutor,
{
    let logical = LogicalName::parse(&target.name);
    let resolved = ProxyResolver::new(registry, chain).resolve(&logical)?;
    let abi = registry.abi(logical.implementation_name())?;

    let function = abi
        .function(&target.method)
        .into_iter()
        .flatten()
        .find(|function| function.inputs.len() == target.args.len())
        .ok_or_else(|| {
            ReadCallError::NoMatchingMethod {
                name: target.name.clone(),
                method: target.method.clone(),
                arity: target.args.len(),
            }
        })?;
    let args = coerce_args(function, &target.args)?;

    let result = ContractCall::new(
        abi.clone(),
        resolved.storage_address(),
        target.method.clone(),
        args,
    )
    .execute(chain)?;
    Ok(result.values().iter().map(format_value).collect())
}

fn format_value(value: &DynSolValue) -> String {
    let join = |items: &[DynSolValue]| {
        items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match value {
        DynSolValue::Bool(value) => value.to_string(),
        DynSolValue::Int(value, _) => value.to_string(),
        DynSolValue::Uint(value, _) => value.to_string(),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(value) => value.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => format!("[{}]", join(items)),
        DynSolValue::Tuple(items) => format!("({})", join(items)),
        other => format!("{other:?}"),
    }
}
