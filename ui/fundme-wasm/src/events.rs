//! Event binding.
//!
//! Wires the page's click listeners to the handlers in `actions.rs`.

use crate::AppController;
use crate::actions;
use crate::dom::Elements;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Attach an async click handler. The handler runs on `spawn_local` with
/// its own clones of the elements and the controller.
macro_rules! on_click_async {
    ($el:expr, $els:expr, $controller:expr, $handler:expr) => {{
        let els = $els.clone();
        let controller = Rc::clone($controller);
        let cb = Closure::wrap(Box::new(move |_: web_sys::MouseEvent| {
            let els2 = els.clone();
            let controller2 = Rc::clone(&controller);
            wasm_bindgen_futures::spawn_local(async move {
                $handler(&els2, &controller2).await;
            });
        }) as Box<dyn FnMut(_)>);
        $el.add_event_listener_with_callback("click", cb.as_ref().unchecked_ref())?;
        cb.forget();
    }};
}

/// Bind all UI event listeners. Call once after init.
pub fn bind_events(els: &Elements, controller: &Rc<AppController>) -> Result<(), JsValue> {
    // ── Wallet ──
    on_click_async!(els.connect_btn, els, controller, actions::on_connect_toggle);

    // ── Contract ──
    on_click_async!(els.fund_btn, els, controller, actions::on_fund);
    on_click_async!(els.withdraw_btn, els, controller, actions::on_withdraw);

    Ok(())
}
