//! Button handlers.
//!
//! Each handler drives one controller operation. Status text and button
//! state are repainted by the controller's listener, so failures are only
//! logged here.

use crate::AppController;
use crate::dom::{self, Elements};
use fm_session_core::{Phase, SessionError};

fn log_failure(action: &str, err: &SessionError) {
    if matches!(err, SessionError::Abandoned) {
        return;
    }
    gloo_console::error!(format!("{action} failed: {err}"));
}

/// Connect when disconnected, disconnect otherwise.
pub async fn on_connect_toggle(_els: &Elements, controller: &AppController) {
    match controller.phase() {
        Phase::Disconnected => {
            if let Err(err) = controller.connect().await {
                log_failure("connect", &err);
            }
        }
        Phase::Connecting => {}
        Phase::Connected | Phase::Submitting => controller.disconnect(),
    }
}

pub async fn on_fund(els: &Elements, controller: &AppController) {
    let amount = dom::get_input_value(&els.fund_amount);
    match controller.submit_fund(&amount).await {
        Ok(receipt) => {
            gloo_console::log!(format!("fund confirmed: {}", receipt.tx_hash));
            els.fund_amount.set_value("");
        }
        Err(err) => log_failure("fund", &err),
    }
}

pub async fn on_withdraw(_els: &Elements, controller: &AppController) {
    match controller.submit_withdraw().await {
        Ok(receipt) => gloo_console::log!(format!("withdraw confirmed: {}", receipt.tx_hash)),
        Err(err) => log_failure("withdraw", &err),
    }
}
