//! Chain client adapter.
//!
//! Everything that touches the JSON-RPC endpoint lives here. The core only
//! sees the narrow [`ChainReader`] interface (balance, supply, receipt logs),
//! which keeps the aggregation and reconciliation code testable against a
//! mock. Signing, gas estimation and transaction inclusion are delegated
//! wholesale to the alloy provider stack.

use alloy::{
    consensus::TxReceipt,
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    pubsub::Subscription,
    rpc::types::{Filter, Log},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolEvent,
};
use async_trait::async_trait;

use crate::error::RpcError;

sol! {
    #[sol(rpc)]
    contract TestERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// Read-only chain state the core depends on.
///
/// Implemented by [`EthChainClient`] for real deployments and by in-memory
/// mocks in tests.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current token balance of `owner`.
    async fn balance_of(&self, owner: Address) -> Result<U256, RpcError>;

    /// Current total token supply.
    async fn total_supply(&self) -> Result<U256, RpcError>;

    /// Logs emitted by the mined transaction `tx_hash`, or `None` if the
    /// transaction is unknown or not yet mined.
    async fn receipt_logs(&self, tx_hash: B256) -> Result<Option<Vec<Log>>, RpcError>;
}

/// Alloy-backed chain client.
pub struct EthChainClient {
    provider: DynProvider,
    contract: Address,
}

impl EthChainClient {
    /// Connect to `rpc_url`. Both `ws://` and `http://` endpoints work, but
    /// push-mode subscriptions require a websocket endpoint.
    pub async fn connect(rpc_url: &str, contract: Address) -> Result<Self, RpcError> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .erased();

        log::info!("🔌 Connected to chain endpoint: {}", rpc_url);
        Ok(Self { provider, contract })
    }

    /// Connect with a signing wallet. Used by the transfer generator only;
    /// the tracker itself never signs anything.
    pub async fn connect_with_signer(
        rpc_url: &str,
        contract: Address,
        private_key: &str,
    ) -> Result<Self, RpcError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| RpcError::Transport(format!("invalid private key: {e}")))?;
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect(rpc_url)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .erased();

        log::info!("🔌 Connected to chain endpoint with signer: {}", rpc_url);
        Ok(Self { provider, contract })
    }

    pub fn contract_address(&self) -> Address {
        self.contract
    }

    /// Open a pubsub subscription filtered to Transfer events emitted by the
    /// tracked contract. Push-mode ingestion drains this subscription.
    pub async fn subscribe_transfer_logs(&self) -> Result<Subscription<Log>, RpcError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(TestERC20::Transfer::SIGNATURE_HASH);

        self.provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))
    }

    /// Send a token transfer from the wallet account and wait for inclusion.
    /// Returns the transaction hash. Gas estimation and nonce management are
    /// handled by the provider fillers.
    pub async fn transfer(&self, to: Address, amount: U256) -> Result<B256, RpcError> {
        let token = TestERC20::new(self.contract, self.provider.clone());

        let pending = token
            .transfer(to, amount)
            .send()
            .await
            .map_err(|e| RpcError::Call(e.to_string()))?;

        pending
            .watch()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ChainReader for EthChainClient {
    async fn balance_of(&self, owner: Address) -> Result<U256, RpcError> {
        let token = TestERC20::new(self.contract, self.provider.clone());
        token
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| RpcError::Call(e.to_string()))
    }

    async fn total_supply(&self) -> Result<U256, RpcError> {
        let token = TestERC20::new(self.contract, self.provider.clone());
        token
            .totalSupply()
            .call()
            .await
            .map_err(|e| RpcError::Call(e.to_string()))
    }

    async fn receipt_logs(&self, tx_hash: B256) -> Result<Option<Vec<Log>>, RpcError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(receipt.map(|r| r.inner.logs().to_vec()))
    }
}
