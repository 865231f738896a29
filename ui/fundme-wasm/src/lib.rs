//! FundMe WASM front end.
//!
//! Binds the page to a [`SessionController`] over the injected wallet and
//! `localStorage`. Rendering is driven entirely by controller snapshots.

pub mod actions;
pub mod dom;
pub mod ethereum;
pub mod events;
pub mod render;
pub mod storage;

use ethereum::{BrowserProvider, TimeoutSleeper};
use fm_api_types::AppConfig;
use fm_chain_client::ChainBinding;
use fm_session_core::SessionController;
use fm_storage::SessionStore;
use std::rc::Rc;
use storage::LocalStorageBackend;
use wasm_bindgen::prelude::*;

pub type AppController = SessionController<BrowserProvider, TimeoutSleeper, LocalStorageBackend>;

/// WASM entry point – called automatically when the module is instantiated.
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    init().await
}

async fn init() -> Result<(), JsValue> {
    let els = dom::Elements::bind()?;
    let config = AppConfig::from_build_env();

    let provider = BrowserProvider::detect(&config);
    let injected = provider.as_ref().and_then(BrowserProvider::injected);
    if provider.is_none() {
        gloo_console::warn!("no Ethereum provider detected");
    }

    let chain = ChainBinding::new(provider, TimeoutSleeper, &config)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let store = SessionStore::new(LocalStorageBackend, &config.storage_namespace);
    let controller: Rc<AppController> = Rc::new(SessionController::new(chain, store));

    {
        let els = els.clone();
        controller.subscribe(move |snapshot| render::render(&els, snapshot));
    }
    render::render(&els, &controller.snapshot());
    events::bind_events(&els, &controller)?;

    if let Some(injected) = injected {
        let controller = Rc::clone(&controller);
        injected.on_accounts_changed(move |accounts| controller.accounts_changed(&accounts))?;
    }

    controller.restore().await;
    if !controller.chain().is_bound() && controller.chain().has_provider() {
        let _ = controller.refresh_balance().await;
    }
    Ok(())
}
