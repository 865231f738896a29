//! Paints a controller snapshot onto the page.

use crate::dom::{self, Elements};
use fm_session_core::{Phase, Snapshot};

pub fn render(els: &Elements, snapshot: &Snapshot) {
    let (connect_label, connect_busy) = match snapshot.phase {
        Phase::Disconnected => ("Connect Wallet", false),
        Phase::Connecting => ("Connecting...", true),
        Phase::Connected | Phase::Submitting => ("Disconnect", false),
    };
    els.connect_btn.set_text_content(Some(connect_label));
    els.connect_btn.set_disabled(connect_busy);

    let can_submit = snapshot.phase == Phase::Connected;
    els.fund_btn.set_disabled(!can_submit);
    els.withdraw_btn.set_disabled(!can_submit);
    // Only a hint; the contract enforces ownership.
    dom::toggle_class(&els.withdraw_btn, "owner", snapshot.is_owner == Some(true));

    let session = &snapshot.session;
    if session.connected {
        dom::set_text(&els.wallet_address, &session.wallet_address);
    } else {
        dom::set_text(&els.wallet_address, "Not connected");
    }

    if session.cached_balance_ether.is_empty() {
        dom::set_text(&els.contract_balance, "\u{2014}");
    } else {
        dom::set_text(
            &els.contract_balance,
            &format!("{} ETH", session.cached_balance_ether),
        );
    }

    match &snapshot.contribution_ether {
        Some(funded) => dom::set_text(&els.contribution, &format!("You funded {funded} ETH")),
        None => dom::set_text(&els.contribution, ""),
    }

    match &snapshot.status {
        Some(status) => {
            dom::set_text(&els.status_line, &status.text);
            dom::toggle_class(&els.status_line, "error", status.is_error());
        }
        None => {
            dom::set_text(&els.status_line, "");
            dom::toggle_class(&els.status_line, "error", false);
        }
    }
}
