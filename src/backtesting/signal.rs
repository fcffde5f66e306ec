//! Strategy signals.

use serde::{Deserialize, Serialize};

/// Action a strategy requests for the current bar.
///
/// Orders are market orders and fill at the *next* bar's open (adjusted for
/// slippage), never at the signal bar — the broker enforces no-lookahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Open a long position (ignored while a position is already open)
    Buy,
    /// Close the open long position (rejected when flat)
    Sell,
    /// Do nothing this bar
    Hold,
}

impl Signal {
    /// Whether this signal requests a fill.
    pub fn is_order(&self) -> bool {
        !matches!(self, Signal::Hold)
    }
}
