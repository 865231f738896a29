//! `window.ethereum` bridge.
//!
//! Wraps the injected EIP-1193 object so the chain binding can call
//! `request({ method, params })` on it. Falls back to a read-only HTTP
//! endpoint when no wallet is injected and one is configured.

use async_trait::async_trait;
use fm_api_types::AppConfig;
use fm_chain_client::{Eip1193Provider, ProviderError, Sleeper};
use fm_chain_rpc::HttpRpcProvider;
use js_sys::{Function, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[derive(Clone)]
pub struct InjectedProvider {
    ethereum: JsValue,
}

impl InjectedProvider {
    /// Probe `window.ethereum`.
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = Reflect::get(&window, &JsValue::from_str("ethereum")).ok()?;
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        Some(Self { ethereum })
    }

    /// Subscribe to `accountsChanged`. The closure lives for the page.
    pub fn on_accounts_changed(&self, mut f: impl FnMut(Vec<String>) + 'static) -> Result<(), JsValue> {
        let on: Function = Reflect::get(&self.ethereum, &JsValue::from_str("on"))?.dyn_into()?;
        let cb = Closure::wrap(Box::new(move |accounts: JsValue| {
            let accounts: Vec<String> = serde_wasm_bindgen::from_value(accounts).unwrap_or_default();
            f(accounts);
        }) as Box<dyn FnMut(JsValue)>);
        on.call2(
            &self.ethereum,
            &JsValue::from_str("accountsChanged"),
            cb.as_ref().unchecked_ref(),
        )?;
        cb.forget();
        Ok(())
    }
}

#[async_trait(?Send)]
impl Eip1193Provider for InjectedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let args = serde_json::json!({ "method": method, "params": params })
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| ProviderError::internal(format!("encode {method}: {e}")))?;

        let request: Function = Reflect::get(&self.ethereum, &JsValue::from_str("request"))
            .map_err(provider_error)?
            .dyn_into()
            .map_err(|_| ProviderError::internal("ethereum.request is not a function"))?;
        let promise: Promise = request
            .call1(&self.ethereum, &args)
            .map_err(provider_error)?
            .dyn_into()
            .map_err(|_| ProviderError::internal("ethereum.request did not return a promise"))?;

        let result = JsFuture::from(promise).await.map_err(provider_error)?;
        if result.is_undefined() || result.is_null() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(result)
            .map_err(|e| ProviderError::internal(format!("decode {method}: {e}")))
    }
}

/// Convert a thrown EIP-1193 error object (`{ code, message, data }`).
fn provider_error(err: JsValue) -> ProviderError {
    let field = |name: &str| Reflect::get(&err, &JsValue::from_str(name)).ok();

    let code = field("code")
        .and_then(|code| code.as_f64())
        .map(|code| code as i64)
        .unwrap_or(ProviderError::INTERNAL);
    let message = field("message")
        .and_then(|message| message.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    let data = field("data")
        .filter(|data| !data.is_undefined() && !data.is_null())
        .and_then(|data| serde_wasm_bindgen::from_value(data).ok());

    ProviderError {
        code,
        message,
        data,
    }
}

/// The injected wallet, or a read-only node when none is present.
pub enum BrowserProvider {
    Injected(InjectedProvider),
    ReadOnly(HttpRpcProvider),
}

impl BrowserProvider {
    pub fn detect(config: &AppConfig) -> Option<Self> {
        InjectedProvider::detect()
            .map(BrowserProvider::Injected)
            .or_else(|| {
                config
                    .rpc_url
                    .clone()
                    .map(|url| BrowserProvider::ReadOnly(HttpRpcProvider::new(Some(url))))
            })
    }

    pub fn injected(&self) -> Option<InjectedProvider> {
        match self {
            BrowserProvider::Injected(provider) => Some(provider.clone()),
            BrowserProvider::ReadOnly(_) => None,
        }
    }
}

#[async_trait(?Send)]
impl Eip1193Provider for BrowserProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match self {
            BrowserProvider::Injected(provider) => provider.request(method, params).await,
            BrowserProvider::ReadOnly(provider) => provider.request(method, params).await,
        }
    }
}

/// `setTimeout`-backed delay; never blocks the UI thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutSleeper;

#[async_trait(?Send)]
impl Sleeper for TimeoutSleeper {
    async fn sleep(&self, duration: Duration) {
        let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        gloo_timers::future::TimeoutFuture::new(millis).await;
    }
}
