use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment address of the FundMe contract.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x4b06254515abf88544ba4c04f10775e68fc0e5e0";

pub const DEFAULT_STORAGE_NAMESPACE: &str = "fundme";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Wallet session as seen by the UI. `connected` is true iff
/// `wallet_address` is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub wallet_address: String,
    pub connected: bool,
    pub cached_balance_ether: String,
}

impl Session {
    pub fn connected(wallet_address: &WalletAddress, cached_balance_ether: &str) -> Self {
        Self {
            wallet_address: wallet_address.0.clone(),
            connected: true,
            cached_balance_ether: cached_balance_ether.to_owned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wallet_address.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Informational,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Informational,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub contract_address: String,
    /// Read-only JSON-RPC endpoint used when no wallet is injected.
    pub rpc_url: Option<String>,
    pub storage_namespace: String,
    pub confirmation_poll_ms: u32,
    pub max_confirmation_polls: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_owned(),
            rpc_url: None,
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_owned(),
            confirmation_poll_ms: 1_500,
            max_confirmation_polls: 400,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `FUNDME_CONTRACT_ADDRESS` / `FUNDME_RPC_URL`
    /// captured at compile time.
    pub fn from_build_env() -> Self {
        let mut config = Self::default();
        if let Some(address) = option_env!("FUNDME_CONTRACT_ADDRESS") {
            config.contract_address = address.to_owned();
        }
        config.rpc_url = option_env!("FUNDME_RPC_URL")
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_owned());
        config
    }
}
