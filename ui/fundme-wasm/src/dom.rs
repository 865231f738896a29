//! DOM element bindings.
//!
//! All fields are resolved once at startup.

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlButtonElement, HtmlInputElement};

// ── Helpers ──

fn doc() -> Result<Document, JsValue> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document"))
}

pub fn by_id(id: &str) -> Option<Element> {
    doc().ok()?.get_element_by_id(id)
}

pub fn by_id_typed<T: JsCast>(id: &str) -> Option<T> {
    by_id(id).and_then(|e| e.dyn_into::<T>().ok())
}

pub fn set_text(el: &Element, text: &str) {
    el.set_text_content(Some(text));
}

pub fn get_input_value(el: &HtmlInputElement) -> String {
    el.value().trim().to_string()
}

pub fn toggle_class(el: &Element, cls: &str, force: bool) {
    let _ = el.class_list().toggle_with_force(cls, force);
}

// ── Elements struct ──

/// All DOM element references used by the FundMe page.
/// Clone-friendly (all inner types are reference-counted via JS GC).
#[derive(Clone)]
pub struct Elements {
    // Wallet
    pub connect_btn: HtmlButtonElement,
    pub wallet_address: Element,

    // Contract read-outs
    pub contract_balance: Element,
    pub contribution: Element,

    // Actions
    pub fund_amount: HtmlInputElement,
    pub fund_btn: HtmlButtonElement,
    pub withdraw_btn: HtmlButtonElement,

    pub status_line: Element,
}

macro_rules! get_el {
    ($id:expr) => {
        by_id($id).ok_or_else(|| JsValue::from_str(&format!("missing element #{}", $id)))?
    };
}

macro_rules! get_input {
    ($id:expr) => {
        by_id_typed::<HtmlInputElement>($id)
            .ok_or_else(|| JsValue::from_str(&format!("missing input #{}", $id)))?
    };
}

macro_rules! get_button {
    ($id:expr) => {
        by_id_typed::<HtmlButtonElement>($id)
            .ok_or_else(|| JsValue::from_str(&format!("missing button #{}", $id)))?
    };
}

impl Elements {
    /// Resolve all DOM references. Call once after DOMContentLoaded.
    pub fn bind() -> Result<Elements, JsValue> {
        Ok(Elements {
            connect_btn: get_button!("connectBtn"),
            wallet_address: get_el!("walletAddress"),

            contract_balance: get_el!("contractBalance"),
            contribution: get_el!("contribution"),

            fund_amount: get_input!("fundAmount"),
            fund_btn: get_button!("fundBtn"),
            withdraw_btn: get_button!("withdrawBtn"),

            status_line: get_el!("statusLine"),
        })
    }
}
