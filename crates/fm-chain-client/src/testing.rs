//! Scripted in-memory wallet and chain for tests.

use crate::{Eip1193Provider, ProviderError, Sleeper, contract, parse_address, units};
use async_trait::async_trait;
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, U256};
use ethers_core::utils::id;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxKind {
    Fund,
    Withdraw,
}

#[derive(Debug, Clone)]
struct PendingTx {
    kind: TxKind,
    from: Address,
    value: U256,
    polls_left: u32,
}

#[derive(Debug, Clone)]
pub struct MockState {
    pub account: Address,
    pub owner: Address,
    /// Whether `eth_accounts` exposes the account without a prompt.
    pub authorized: bool,
    pub reject_connect: bool,
    /// Extra yields before the next `eth_requestAccounts` answers.
    pub connect_yields: u32,
    pub fail_balance: bool,
    pub reject_send: bool,
    pub withdraw_revert: Option<ProviderError>,
    pub mine_reverted: bool,
    /// Receipt polls answered with `null` before a transaction is mined.
    pub pending_polls: u32,
    pub contract_balance: U256,
    pub contributions: HashMap<Address, U256>,
    pub calls: Vec<String>,
    pub transactions: Vec<Value>,
    pending: HashMap<String, PendingTx>,
    block: u64,
}

/// Cheap to clone; clones share state so tests can inspect what the
/// binding did.
#[derive(Debug, Clone)]
pub struct MockProvider {
    state: Rc<RefCell<MockState>>,
}

impl MockProvider {
    pub fn new(account: &str, contract_balance: U256) -> Self {
        let account = parse_address(account).unwrap_or_default();
        Self {
            state: Rc::new(RefCell::new(MockState {
                account,
                owner: account,
                authorized: false,
                reject_connect: false,
                connect_yields: 0,
                fail_balance: false,
                reject_send: false,
                withdraw_revert: None,
                mine_reverted: false,
                pending_polls: 0,
                contract_balance,
                contributions: HashMap::new(),
                calls: Vec::new(),
                transactions: Vec::new(),
                pending: HashMap::new(),
                block: 100,
            })),
        }
    }

    /// The error MetaMask reports when `withdraw()` hits `NotOwner()`.
    pub fn not_owner_error() -> ProviderError {
        let data = Bytes::from(id("NotOwner()").to_vec()).to_string();
        ProviderError {
            code: ProviderError::INTERNAL,
            message: "Internal JSON-RPC error.".to_owned(),
            data: Some(json!({ "code": ProviderError::EXECUTION_REVERTED, "data": data })),
        }
    }

    pub fn update<F: FnOnce(&mut MockState)>(&self, f: F) {
        f(&mut self.state.borrow_mut());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn contract_balance(&self) -> U256 {
        self.state.borrow().contract_balance
    }

    pub fn last_transaction(&self) -> Option<Value> {
        self.state.borrow().transactions.last().cloned()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(method.to_owned());

        match method {
            "eth_requestAccounts" => {
                if state.reject_connect {
                    return Err(ProviderError {
                        code: ProviderError::USER_REJECTED,
                        message: "User rejected the request.".to_owned(),
                        data: None,
                    });
                }
                state.authorized = true;
                Ok(json!([format!("{:?}", state.account)]))
            }
            "eth_accounts" => {
                if state.authorized {
                    Ok(json!([format!("{:?}", state.account)]))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_getBalance" => {
                if state.fail_balance {
                    return Err(ProviderError::internal("header not found"));
                }
                Ok(json!(units::to_quantity(state.contract_balance)))
            }
            "eth_call" => {
                let data = contract::decode_hex(&params[0]["data"]).map_err(internal)?;
                let (selector, args) = data.split_at(4);
                let output = if selector == id(contract::OWNER) {
                    abi::encode(&[Token::Address(state.owner)])
                } else if selector == id(contract::ADDRESS_TO_AMOUNT_FUNDED) {
                    let funder = abi::decode(&[ParamType::Address], args)
                        .ok()
                        .and_then(|tokens| tokens.into_iter().next())
                        .and_then(Token::into_address)
                        .ok_or_else(|| ProviderError::internal("bad funder argument"))?;
                    let funded = state.contributions.get(&funder).copied().unwrap_or_default();
                    abi::encode(&[Token::Uint(funded)])
                } else {
                    return Err(ProviderError::internal("unknown selector"));
                };
                Ok(json!(Bytes::from(output).to_string()))
            }
            "eth_sendTransaction" => {
                if state.reject_send {
                    return Err(ProviderError {
                        code: ProviderError::USER_REJECTED,
                        message: "User denied transaction signature.".to_owned(),
                        data: None,
                    });
                }
                let tx = params[0].clone();
                let data = contract::decode_hex(&tx["data"]).map_err(internal)?;
                let kind = if data.as_ref() == id(contract::FUND) {
                    TxKind::Fund
                } else if data.as_ref() == id(contract::WITHDRAW) {
                    TxKind::Withdraw
                } else {
                    return Err(ProviderError::internal("unknown selector"));
                };
                if kind == TxKind::Withdraw {
                    if let Some(err) = state.withdraw_revert.clone() {
                        return Err(err);
                    }
                }

                let from = tx["from"]
                    .as_str()
                    .and_then(|from| parse_address(from).ok())
                    .unwrap_or_default();
                let value = units::parse_quantity(&tx["value"]).map_err(internal)?;
                let hash = format!("0x{:064x}", state.transactions.len() + 1);
                let polls_left = state.pending_polls;
                state.pending.insert(
                    hash.clone(),
                    PendingTx {
                        kind,
                        from,
                        value,
                        polls_left,
                    },
                );
                state.transactions.push(tx);
                Ok(json!(hash))
            }
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().unwrap_or_default().to_owned();
                let Some(pending) = state.pending.get_mut(&hash) else {
                    return Ok(Value::Null);
                };
                if pending.polls_left > 0 {
                    pending.polls_left -= 1;
                    return Ok(Value::Null);
                }

                let Some(mined) = state.pending.remove(&hash) else {
                    return Ok(Value::Null);
                };
                state.block += 1;
                let success = !state.mine_reverted;
                if success {
                    match mined.kind {
                        TxKind::Fund => {
                            state.contract_balance += mined.value;
                            *state.contributions.entry(mined.from).or_default() += mined.value;
                        }
                        TxKind::Withdraw => {
                            state.contract_balance = U256::zero();
                            state.contributions.clear();
                        }
                    }
                }
                Ok(json!({
                    "transactionHash": hash,
                    "blockNumber": units::to_quantity(U256::from(state.block)),
                    "status": if success { "0x1" } else { "0x0" },
                }))
            }
            other => Err(ProviderError {
                code: -32601,
                message: format!("method {other} not supported"),
                data: None,
            }),
        }
    }
}

fn internal(err: crate::ChainError) -> ProviderError {
    ProviderError::internal(err.to_string())
}

#[async_trait(?Send)]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        if method == "eth_requestAccounts" {
            let delay = std::mem::take(&mut self.state.borrow_mut().connect_yields);
            for _ in 0..delay {
                tokio::task::yield_now().await;
            }
        }
        let result = self.handle(method, &params);
        tokio::task::yield_now().await;
        result
    }
}

/// Yields once to the executor instead of sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldSleeper;

#[async_trait(?Send)]
impl Sleeper for YieldSleeper {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}
