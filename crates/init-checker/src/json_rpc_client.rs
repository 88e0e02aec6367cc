use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
    },
    providers::ProviderBuilder,
};
use alloy_provider::{
    Provider,
    RootProvider,
};
use alloy_rpc_types::TransactionRequest;
use alloy_transport::TransportError;
use contract_introspect::{
    CallExecutor,
    CodeReader,
    StorageReader,
};
use tokio::runtime::Handle;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to the RPC endpoint: {0}")]
    Connect(#[source] TransportError),
    #[error("RPC request failed: {0}")]
    Provider(#[from] TransportError),
    #[error("RPC worker thread panicked")]
    Runtime,
}

/// JSON-RPC backed chain collaborator.
///
/// The introspection readers are synchronous, so every request blocks on the
/// runtime the client was created in from a scoped thread.
pub struct Client {
    provider: RootProvider,
    handle: Handle,
}

impl Client {
    pub async fn try_new_with_rpc_url(rpc_url: &str) -> Result<Self, ClientError> {
        // Create a provider (this needs to be done in an async context)
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(ClientError::Connect)?;

        Ok(Self {
            provider: provider.root().clone(),
            handle: Handle::current(),
        })
    }

    fn block_on<F, T>(&self, future: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>> + Send,
        T: Send,
    {
        std::thread::scope(|s| {
            s.spawn(|| self.handle.block_on(future))
                .join()
                .map_err(|_| ClientError::Runtime)?
        })
    }
}

impl StorageReader for Client {
    type Error = ClientError;

    fn storage_at(&self, address: Address, slot: U256) -> Result<B256, Self::Error> {
        let provider = self.provider.clone();
        self.block_on(async move {
            let value = provider.get_storage_at(address, slot).await?;
            Ok(B256::from(value.to_be_bytes::<32>()))
        })
    }
}

impl CallExecutor for Client {
    type Error = ClientError;

    fn call(&self, request: &TransactionRequest) -> Result<Bytes, Self::Error> {
        let provider = self.provider.clone();
        let request = request.clone();
        self.block_on(async move { Ok(provider.call(request).await?) })
    }
}

impl CodeReader for Client {
    type Error = ClientError;

    fn code_at(&self, address: Address) -> Result<Bytes, Self::Error> {
        let provider = self.provider.clone();
        self.block_on(async move { Ok(provider.get_code_at(address).await?) })
    }
}
