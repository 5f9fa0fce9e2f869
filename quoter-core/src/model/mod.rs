//! Inventory-skew quote model
//!
//! Recomputed on every reference-price update (and after every fill, since
//! the fair price moves with inventory):
//!
//! ```text
//! skew_factor        = 1 - max_diff * position / max_position
//! fair_price         = reference_price * skew_factor
//! kyle_impact        = reference_price * max_diff / max_position
//! avg_tick_liquidity = tick_jump / kyle_impact
//! ```
//!
//! `max_diff` is the largest fractional price deviation tolerated at full
//! position, so the linear skew bids lower (asks higher) as the book gets
//! long. `kyle_impact` is the implied price move per unit of inventory;
//! dividing the tick size by it yields the resting depth per tick that
//! spends the impact budget evenly across the ladder.

use crate::core::{ExecutionBand, Side};
use rust_decimal::Decimal;

/// Static model inputs, lifted out of the per-market config.
#[derive(Debug, Clone, Copy)]
pub struct ModelParams {
    /// Fractional skew at full position.
    pub max_diff: Decimal,
    /// Inventory limit per side.
    pub max_position: Decimal,
    /// Price grid quantum.
    pub tick_jump: Decimal,
    /// Half-spread added around the fair price before anchoring.
    pub spread: Decimal,
}

/// Output of one model evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteModel {
    pub fair_price: Decimal,
    pub kyle_impact: Decimal,
    pub avg_tick_liquidity: Decimal,
    pub spread: Decimal,
}

impl QuoteModel {
    /// Evaluate the model for a reference price and current signed position.
    pub fn from_reference(
        reference_price: Decimal,
        position: Decimal,
        params: &ModelParams,
    ) -> Self {
        let skew_factor =
            Decimal::ONE - params.max_diff * position / params.max_position;
        let fair_price = reference_price * skew_factor;
        let kyle_impact = reference_price * params.max_diff / params.max_position;
        let avg_tick_liquidity = params.tick_jump / kyle_impact;
        Self {
            fair_price,
            kyle_impact,
            avg_tick_liquidity,
            spread: params.spread,
        }
    }

    /// Raw top-of-ladder anchor for a side, clamped against the execution
    /// band: bids must not quote above `band.high`, asks not below
    /// `band.low`. The ladder quantizes the anchor onto its grid.
    pub fn anchor(&self, side: Side, band: &ExecutionBand) -> Decimal {
        match side {
            Side::Bid => (self.fair_price - self.spread).min(band.high),
            Side::Ask => (self.fair_price + self.spread).max(band.low),
        }
    }
}
