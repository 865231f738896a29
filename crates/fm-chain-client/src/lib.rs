//! Wallet and contract binding for the FundMe contract.
//!
//! Everything talks to the chain through [`Eip1193Provider`], the same
//! `request({ method, params })` surface a browser wallet injects. The
//! binding keeps the signer-backed contract handle and exposes the
//! connect / fund / withdraw / read-balance operations.

pub mod contract;
pub mod units;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

use async_trait::async_trait;
use ethers_core::abi::Token;
use ethers_core::types::{Address, Bytes, U256};
use ethers_core::utils::to_checksum;
use fm_api_types::{AppConfig, Receipt, TxHash, WalletAddress};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// EIP-1193 error object.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const REQUEST_PENDING: i64 = -32002;
    pub const EXECUTION_REVERTED: i64 = 3;
    pub const INTERNAL: i64 = -32603;

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self.code, Self::USER_REJECTED | Self::UNAUTHORIZED)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("no wallet provider found; install a browser wallet such as MetaMask")]
    ProviderUnavailable,
    #[error("wallet request rejected: {0}")]
    UserRejected(String),
    #[error("wallet is not connected")]
    NotConnected,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
    #[error("contract reverted: {}", .0.as_deref().unwrap_or("no reason given"))]
    ContractReverted(Option<String>),
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("rpc request failed: {0}")]
    Rpc(ProviderError),
    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// The injected wallet surface (`window.ethereum.request`).
#[async_trait(?Send)]
pub trait Eip1193Provider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// Non-blocking delay between confirmation polls.
#[async_trait(?Send)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

/// Contract address plus the account that signs for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractHandle {
    pub contract: Address,
    pub signer: Address,
}

pub struct ChainBinding<P, S> {
    provider: Option<P>,
    sleeper: S,
    contract: Address,
    poll_interval: Duration,
    max_polls: u32,
    handle: RefCell<Option<ContractHandle>>,
}

impl<P, S> ChainBinding<P, S>
where
    P: Eip1193Provider,
    S: Sleeper,
{
    /// `provider` is `None` when the availability probe found no wallet.
    pub fn new(provider: Option<P>, sleeper: S, config: &AppConfig) -> Result<Self, ChainError> {
        let contract = parse_address(&config.contract_address)?;
        Ok(Self {
            provider,
            sleeper,
            contract,
            poll_interval: Duration::from_millis(u64::from(config.confirmation_poll_ms)),
            max_polls: config.max_confirmation_polls.max(1),
            handle: RefCell::new(None),
        })
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn is_bound(&self) -> bool {
        self.handle.borrow().is_some()
    }

    pub fn contract_address(&self) -> WalletAddress {
        checksummed(self.contract)
    }

    pub fn unbind(&self) {
        if self.handle.borrow_mut().take().is_some() {
            debug!("contract binding released");
        }
    }

    /// Ask the wallet for account access and bind the contract to it.
    pub async fn connect(&self) -> Result<WalletAddress, ChainError> {
        let address = self.request_account().await?;
        self.bind(&address)?;
        Ok(address)
    }

    /// Ask the wallet for account access. Leaves the binding untouched.
    pub async fn request_account(&self) -> Result<WalletAddress, ChainError> {
        let provider = self.provider()?;
        let accounts = provider
            .request("eth_requestAccounts", json!([]))
            .await
            .map_err(|err| {
                if err.is_user_rejection() || err.code == ProviderError::REQUEST_PENDING {
                    ChainError::UserRejected(err.message)
                } else if err.code == ProviderError::UNSUPPORTED_METHOD {
                    ChainError::ProviderUnavailable
                } else {
                    ChainError::Rpc(err)
                }
            })?;

        let signer = parse_accounts(&accounts)?
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::UserRejected("wallet returned no accounts".to_owned()))?;
        Ok(checksummed(signer))
    }

    /// Re-bind to `expected` without a permission prompt, if the wallet
    /// still exposes that account.
    pub async fn reconnect(&self, expected: &str) -> Result<Option<WalletAddress>, ChainError> {
        let Some(address) = self.authorized_account(expected).await? else {
            return Ok(None);
        };
        self.bind(&address)?;
        Ok(Some(address))
    }

    /// `expected`, checksummed, if `eth_accounts` still exposes it.
    pub async fn authorized_account(
        &self,
        expected: &str,
    ) -> Result<Option<WalletAddress>, ChainError> {
        let provider = self.provider()?;
        let expected = parse_address(expected)?;
        let accounts = provider
            .request("eth_accounts", json!([]))
            .await
            .map_err(ChainError::Rpc)?;

        Ok(parse_accounts(&accounts)?
            .contains(&expected)
            .then(|| checksummed(expected)))
    }

    /// Bind the contract to `signer`, replacing any previous binding.
    pub fn bind(&self, signer: &WalletAddress) -> Result<(), ChainError> {
        let signer = parse_address(&signer.0)?;
        *self.handle.borrow_mut() = Some(ContractHandle {
            contract: self.contract,
            signer,
        });
        info!(signer = %checksummed(signer), contract = %self.contract_address(), "contract bound to signer");
        Ok(())
    }

    /// Contract's native balance in ether. Needs no signer.
    pub async fn read_balance(&self) -> Result<String, ChainError> {
        let provider = self.provider()?;
        let raw = provider
            .request("eth_getBalance", json!([hex_address(self.contract), "latest"]))
            .await
            .map_err(ChainError::Rpc)?;
        let wei = units::parse_quantity(&raw)?;
        Ok(units::format_ether(wei))
    }

    /// Amount `funder` has sent to the contract, in ether.
    pub async fn funded_by(&self, funder: &WalletAddress) -> Result<String, ChainError> {
        let funder = parse_address(&funder.0)?;
        let data = contract::call_data(
            contract::ADDRESS_TO_AMOUNT_FUNDED,
            &[Token::Address(funder)],
        );
        let output = self.call(data).await?;
        Ok(units::format_ether(contract::decode_uint(&output)?))
    }

    pub async fn owner(&self) -> Result<WalletAddress, ChainError> {
        let output = self.call(contract::call_data(contract::OWNER, &[])).await?;
        Ok(checksummed(contract::decode_address(&output)?))
    }

    pub async fn fund(&self, amount_ether: &str) -> Result<TxHash, ChainError> {
        let handle = self.handle()?;
        let value = units::parse_ether_amount(amount_ether)?;
        let data = contract::call_data(contract::FUND, &[]);
        self.send_transaction(handle, data, value).await
    }

    pub async fn withdraw(&self) -> Result<TxHash, ChainError> {
        let handle = self.handle()?;
        let data = contract::call_data(contract::WITHDRAW, &[]);
        self.send_transaction(handle, data, U256::zero()).await
    }

    /// Poll for the receipt, yielding between polls.
    pub async fn await_confirmation(&self, tx_hash: &TxHash) -> Result<Receipt, ChainError> {
        let provider = self.provider()?;

        for attempt in 0..self.max_polls {
            let raw = provider
                .request("eth_getTransactionReceipt", json!([tx_hash.0]))
                .await
                .map_err(ChainError::Rpc)?;

            if !raw.is_null() {
                let receipt = parse_receipt(tx_hash, &raw)?;
                if !receipt.success {
                    warn!(tx_hash = %tx_hash, block = receipt.block_number, "transaction reverted");
                    return Err(ChainError::TransactionFailed(format!(
                        "transaction {tx_hash} reverted in block {}",
                        receipt.block_number
                    )));
                }
                info!(tx_hash = %tx_hash, block = receipt.block_number, "transaction confirmed");
                return Ok(receipt);
            }

            debug!(tx_hash = %tx_hash, attempt, "receipt not yet available");
            self.sleeper.sleep(self.poll_interval).await;
        }

        Err(ChainError::TransactionFailed(format!(
            "transaction {tx_hash} was not mined after {} polls",
            self.max_polls
        )))
    }

    fn provider(&self) -> Result<&P, ChainError> {
        self.provider.as_ref().ok_or(ChainError::ProviderUnavailable)
    }

    fn handle(&self) -> Result<ContractHandle, ChainError> {
        (*self.handle.borrow()).ok_or(ChainError::NotConnected)
    }

    async fn call(&self, data: Bytes) -> Result<Bytes, ChainError> {
        let provider = self.provider()?;
        let call = json!({ "to": hex_address(self.contract), "data": data.to_string() });
        let raw = provider
            .request("eth_call", json!([call, "latest"]))
            .await
            .map_err(ChainError::Rpc)?;
        contract::decode_hex(&raw)
    }

    async fn send_transaction(
        &self,
        handle: ContractHandle,
        data: Bytes,
        value: U256,
    ) -> Result<TxHash, ChainError> {
        let provider = self.provider()?;
        let tx = json!({
            "from": hex_address(handle.signer),
            "to": hex_address(handle.contract),
            "value": units::to_quantity(value),
            "data": data.to_string(),
        });

        let raw = provider
            .request("eth_sendTransaction", json!([tx]))
            .await
            .map_err(submission_error)?;
        let hash = raw
            .as_str()
            .ok_or_else(|| ChainError::Decode(format!("expected transaction hash, got {raw}")))?;

        info!(tx_hash = hash, value = %units::format_ether(value), "transaction submitted");
        Ok(TxHash(hash.to_owned()))
    }
}

fn submission_error(err: ProviderError) -> ChainError {
    if let Some(reason) = contract::revert_reason(&err) {
        return ChainError::ContractReverted(reason);
    }
    if err.is_user_rejection() {
        return ChainError::TransactionRejected(format!("wallet declined: {}", err.message));
    }
    ChainError::TransactionRejected(err.message)
}

pub fn parse_address(text: &str) -> Result<Address, ChainError> {
    text.trim()
        .parse::<Address>()
        .map_err(|_| ChainError::Decode(format!("'{text}' is not an address")))
}

pub fn checksummed(address: Address) -> WalletAddress {
    WalletAddress(to_checksum(&address, None))
}

fn hex_address(address: Address) -> String {
    format!("{address:?}")
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>, ChainError> {
    let accounts = value
        .as_array()
        .ok_or_else(|| ChainError::Decode(format!("expected account list, got {value}")))?;
    accounts
        .iter()
        .map(|account| {
            account
                .as_str()
                .ok_or_else(|| ChainError::Decode(format!("account {account} is not a string")))
                .and_then(parse_address)
        })
        .collect()
}

fn parse_receipt(tx_hash: &TxHash, raw: &Value) -> Result<Receipt, ChainError> {
    let block_number = match raw.get("blockNumber") {
        Some(Value::Null) | None => 0,
        Some(number) => units::parse_quantity(number)?.low_u64(),
    };
    // Pre-Byzantium receipts carry no status; treat them as successful.
    let success = match raw.get("status") {
        Some(Value::Null) | None => true,
        Some(status) => !units::parse_quantity(status)?.is_zero(),
    };
    Ok(Receipt {
        tx_hash: tx_hash.clone(),
        block_number,
        success,
    })
}
