//! Per-market configuration
//!
//! Parameters come from a JSON file (`--config`) or from the built-in
//! per-market presets. Validation happens once at startup; a config that
//! fails any check refuses to start rather than quoting with half-formed
//! limits.

use crate::core::TickGrid;
use crate::ladder::ReconcileParams;
use crate::model::ModelParams;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

fn default_order_leverage() -> u32 {
    10
}

fn default_target_leverage() -> u32 {
    10
}

fn default_hysteresis_low() -> Decimal {
    dec!(0.9)
}

fn default_hysteresis_min() -> Decimal {
    dec!(0.8)
}

/// Everything the quoting core needs to know about one market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Venue symbol to quote.
    pub market: String,
    /// Asset the balance is held in.
    pub money_asset: String,
    /// Price grid quantum.
    pub tick_jump: Decimal,
    /// Smallest placeable size; also the size quantum.
    pub min_order_size: Decimal,
    /// Upper bound per placement.
    pub max_order_size: Decimal,
    /// Target rung count per side (the ring holds twice as many slots).
    pub orders_per_side: usize,
    /// Inventory limit per side.
    pub max_position: Decimal,
    /// Per-side resting size cap; defaults to `max_position`.
    #[serde(default)]
    pub max_liquidity: Option<Decimal>,
    /// Fractional price skew at full position.
    pub max_diff: Decimal,
    /// Half-spread around the fair price.
    #[serde(default)]
    pub spread: Decimal,
    /// Leverage passed through on every placement.
    #[serde(default = "default_order_leverage")]
    pub order_leverage: u32,
    /// Account leverage target, passed through on the user-data
    /// subscription.
    #[serde(default = "default_target_leverage")]
    pub target_leverage: u32,
    /// Place into a rung once it falls below this fraction of the target
    /// curve. The lower the value, the more the ladder tolerates before
    /// acting.
    #[serde(default = "default_hysteresis_low")]
    pub hysteresis_low: Decimal,
    /// Cancel-to-upsize a rung below this fraction of the target curve.
    #[serde(default = "default_hysteresis_min")]
    pub hysteresis_min: Decimal,
}

impl MarketConfig {
    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: MarketConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in parameter sets for the markets we quote regularly.
    pub fn preset(market: &str) -> Option<Self> {
        let cfg = match market {
            "ETH" | "ETH-PERP" => Self {
                market: market.to_string(),
                money_asset: "USD".to_string(),
                tick_jump: dec!(0.5),
                min_order_size: dec!(0.5),
                max_order_size: dec!(10.0),
                orders_per_side: 35,
                max_position: dec!(100.0),
                max_liquidity: None,
                max_diff: dec!(0.004),
                spread: Decimal::ZERO,
                order_leverage: default_order_leverage(),
                target_leverage: default_target_leverage(),
                hysteresis_low: default_hysteresis_low(),
                hysteresis_min: default_hysteresis_min(),
            },
            "SOL" | "SOL-PERP" => Self {
                market: market.to_string(),
                money_asset: "USD".to_string(),
                tick_jump: dec!(0.05),
                min_order_size: dec!(10.0),
                max_order_size: dec!(100.0),
                orders_per_side: 35,
                max_position: dec!(500.0),
                max_liquidity: None,
                max_diff: dec!(0.004),
                spread: Decimal::ZERO,
                order_leverage: default_order_leverage(),
                target_leverage: default_target_leverage(),
                hysteresis_low: default_hysteresis_low(),
                hysteresis_min: default_hysteresis_min(),
            },
            "BNB" | "BNB-PERP" => Self {
                market: market.to_string(),
                money_asset: "USD".to_string(),
                tick_jump: dec!(0.5),
                min_order_size: dec!(1.0),
                max_order_size: dec!(10.0),
                orders_per_side: 20,
                max_position: dec!(150.0),
                max_liquidity: Some(dec!(70.0)),
                max_diff: dec!(0.004),
                spread: Decimal::ZERO,
                order_leverage: default_order_leverage(),
                target_leverage: default_target_leverage(),
                hysteresis_low: default_hysteresis_low(),
                hysteresis_min: default_hysteresis_min(),
            },
            "BTC" | "BTC-PERP" => Self {
                market: market.to_string(),
                money_asset: "USD".to_string(),
                tick_jump: dec!(2.0),
                min_order_size: dec!(0.01),
                max_order_size: dec!(10.0),
                orders_per_side: 50,
                max_position: dec!(18.0),
                max_liquidity: None,
                max_diff: dec!(0.004),
                spread: Decimal::ZERO,
                order_leverage: default_order_leverage(),
                target_leverage: default_target_leverage(),
                hysteresis_low: default_hysteresis_low(),
                hysteresis_min: default_hysteresis_min(),
            },
            _ => return None,
        };
        Some(cfg)
    }

    /// Validate parameter sanity. Every violation refuses startup.
    pub fn validate(&self) -> Result<()> {
        if self.market.is_empty() {
            bail!("market must not be empty");
        }
        if self.money_asset.is_empty() {
            bail!("money_asset must not be empty");
        }
        if self.tick_jump <= Decimal::ZERO {
            bail!("tick_jump must be positive");
        }
        if self.min_order_size <= Decimal::ZERO {
            bail!("min_order_size must be positive");
        }
        if self.max_order_size < self.min_order_size {
            bail!("max_order_size cannot be below min_order_size");
        }
        if self.orders_per_side == 0 {
            bail!("orders_per_side must be at least 1");
        }
        if self.max_position <= Decimal::ZERO {
            bail!("max_position must be positive");
        }
        if let Some(max_liquidity) = self.max_liquidity {
            if max_liquidity <= Decimal::ZERO {
                bail!("max_liquidity must be positive when set");
            }
        }
        if self.max_diff <= Decimal::ZERO {
            bail!("max_diff must be positive");
        }
        if self.spread < Decimal::ZERO {
            bail!("spread cannot be negative");
        }
        if self.hysteresis_min <= Decimal::ZERO
            || self.hysteresis_min > self.hysteresis_low
            || self.hysteresis_low > Decimal::ONE
        {
            bail!("hysteresis constants must satisfy 0 < min <= low <= 1");
        }
        Ok(())
    }

    /// Resting size cap per side.
    pub fn max_liquidity(&self) -> Decimal {
        self.max_liquidity.unwrap_or(self.max_position)
    }

    pub fn grid(&self) -> TickGrid {
        TickGrid::new(self.tick_jump, self.min_order_size)
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            max_diff: self.max_diff,
            max_position: self.max_position,
            tick_jump: self.tick_jump,
            spread: self.spread,
        }
    }

    pub fn reconcile_params(&self) -> ReconcileParams {
        ReconcileParams {
            max_liquidity: self.max_liquidity(),
            max_order_size: self.max_order_size,
            hysteresis_low: self.hysteresis_low,
            hysteresis_min: self.hysteresis_min,
            leverage: self.order_leverage,
        }
    }
}
