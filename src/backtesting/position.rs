//! Position and trade types for the long-only broker.

use serde::{Deserialize, Serialize};

/// An open long position.
///
/// The broker holds at most one open position per instrument.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Fill timestamp of the entry
    pub entry_timestamp: i64,
    /// Entry fill price (after slippage)
    pub entry_price: f64,
    /// Whole base units held
    pub size: f64,
    /// Commission paid on entry
    pub entry_fee: f64,
}

impl Position {
    /// Create a position from an entry fill.
    pub fn new(entry_timestamp: i64, entry_price: f64, size: f64, entry_fee: f64) -> Self {
        Self { entry_timestamp, entry_price, size, entry_fee }
    }

    /// Mark-to-market value of the held units at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.size * price
    }

    /// Close this position with an exit fill, producing the trade record.
    pub fn close(self, exit_timestamp: i64, exit_price: f64, exit_fee: f64) -> Trade {
        let pnl = (exit_price - self.entry_price) * self.size - self.entry_fee - exit_fee;
        Trade {
            entry_timestamp: self.entry_timestamp,
            exit_timestamp,
            entry_price: self.entry_price,
            exit_price,
            size: self.size,
            pnl,
            entry_fee: self.entry_fee,
            exit_fee,
        }
    }
}

/// A completed round trip.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Entry fill timestamp
    pub entry_timestamp: i64,
    /// Exit fill timestamp (≥ entry)
    pub exit_timestamp: i64,
    /// Entry fill price
    pub entry_price: f64,
    /// Exit fill price
    pub exit_price: f64,
    /// Whole base units traded
    pub size: f64,
    /// Realized P&L after both fees
    pub pnl: f64,
    /// Commission paid on entry
    pub entry_fee: f64,
    /// Commission paid on exit
    pub exit_fee: f64,
}

impl Trade {
    /// Whether this trade made money.
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// Whether this trade lost money.
    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }

    /// Holding time in seconds.
    pub fn duration_secs(&self) -> i64 {
        self.exit_timestamp - self.entry_timestamp
    }

    /// Holding time in fractional days.
    pub fn duration_days(&self) -> f64 {
        self.duration_secs() as f64 / 86_400.0
    }
}

/// Portfolio value recorded at the end of every processed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Bar timestamp
    pub timestamp: i64,
    /// Mark-to-market portfolio value (cash + position × close)
    pub value: f64,
}
