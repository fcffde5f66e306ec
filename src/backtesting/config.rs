//! Broker configuration and builder.

use serde::{Deserialize, Serialize};

use super::error::{BacktestError, Result};

/// Which configured commission rate the broker charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    /// Maker rate (resting orders)
    Maker,
    /// Taker rate (crossing orders)
    Taker,
}

/// Configuration for the bar-level broker simulation.
///
/// Use `BrokerConfig::builder()` to construct with the builder pattern.
///
/// # Example
///
/// ```
/// use walkforward::backtesting::BrokerConfig;
///
/// let config = BrokerConfig::builder()
///     .initial_capital(50_000.0)
///     .commission_taker(0.002)
///     .slippage_pct(0.0005)
///     .build()
///     .unwrap();
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Starting cash in quote currency
    pub initial_capital: f64,

    /// Taker commission as a fraction of notional (0.0 - 1.0)
    pub commission_taker: f64,

    /// Maker commission as a fraction of notional (0.0 - 1.0)
    pub commission_maker: f64,

    /// Which commission rate is active
    pub fee_type: FeeType,

    /// Slippage as a fraction of the fill price (0.0 - 1.0).
    ///
    /// Buys fill at `open × (1 + slippage)`, sells at `open × (1 − slippage)`,
    /// clamped into the fill bar's high/low range.
    pub slippage_pct: f64,

    /// Fraction of available cash committed per entry (0.0 - 1.0).
    ///
    /// Position size is `floor(cash × position_fraction / fill_price)` whole
    /// base units.
    pub position_fraction: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            commission_taker: 0.001,
            commission_maker: 0.001,
            fee_type: FeeType::Maker,
            slippage_pct: 0.0005,
            position_fraction: 0.9,
        }
    }
}

impl BrokerConfig {
    /// Create a new builder
    pub fn builder() -> BrokerConfigBuilder {
        BrokerConfigBuilder::default()
    }

    /// Create a frictionless configuration with no commission or slippage.
    ///
    /// Useful for unit tests and synthetic scenarios.
    pub fn zero_cost() -> Self {
        Self {
            commission_taker: 0.0,
            commission_maker: 0.0,
            slippage_pct: 0.0,
            ..Default::default()
        }
    }

    /// The active commission rate per the configured fee type.
    pub fn commission_rate(&self) -> f64 {
        match self.fee_type {
            FeeType::Maker => self.commission_maker,
            FeeType::Taker => self.commission_taker,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= 0.0 {
            return Err(BacktestError::invalid_param("initial_capital", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.commission_taker) {
            return Err(BacktestError::invalid_param(
                "commission_taker",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.commission_maker) {
            return Err(BacktestError::invalid_param(
                "commission_maker",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.slippage_pct) {
            return Err(BacktestError::invalid_param(
                "slippage_pct",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.position_fraction <= 0.0 || self.position_fraction > 1.0 {
            return Err(BacktestError::invalid_param(
                "position_fraction",
                "must be between 0.0 (exclusive) and 1.0 (inclusive)",
            ));
        }
        Ok(())
    }

    /// Buy fill price: next-bar open pushed up by slippage, clamped into the
    /// bar's traded range.
    pub fn buy_fill_price(&self, open: f64, high: f64, low: f64) -> f64 {
        (open * (1.0 + self.slippage_pct)).clamp(low, high)
    }

    /// Sell fill price: next-bar open pushed down by slippage, clamped into
    /// the bar's traded range.
    pub fn sell_fill_price(&self, open: f64, high: f64, low: f64) -> f64 {
        (open * (1.0 - self.slippage_pct)).clamp(low, high)
    }

    /// Whole-unit position size for an entry at `price`.
    pub fn position_size(&self, cash: f64, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        (cash * self.position_fraction / price).floor().max(0.0)
    }
}

/// Builder for BrokerConfig
#[derive(Default)]
pub struct BrokerConfigBuilder {
    config: BrokerConfig,
}

impl BrokerConfigBuilder {
    /// Set starting cash
    pub fn initial_capital(mut self, capital: f64) -> Self {
        self.config.initial_capital = capital;
        self
    }

    /// Set the taker commission rate
    pub fn commission_taker(mut self, rate: f64) -> Self {
        self.config.commission_taker = rate;
        self
    }

    /// Set the maker commission rate
    pub fn commission_maker(mut self, rate: f64) -> Self {
        self.config.commission_maker = rate;
        self
    }

    /// Select which commission rate is active
    pub fn fee_type(mut self, fee_type: FeeType) -> Self {
        self.config.fee_type = fee_type;
        self
    }

    /// Set slippage as a fraction of the fill price
    pub fn slippage_pct(mut self, pct: f64) -> Self {
        self.config.slippage_pct = pct;
        self
    }

    /// Set the fraction of cash committed per entry
    pub fn position_fraction(mut self, fraction: f64) -> Self {
        self.config.position_fraction = fraction;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<BrokerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
