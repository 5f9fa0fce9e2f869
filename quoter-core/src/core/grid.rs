//! Tick/lot grid quantization
//!
//! All prices the agent emits live on the grid `{k * tick_jump | k ∈ ℤ}` and
//! all sizes are multiples of `min_order_size`. Quantization is side-aware:
//! bids round down (never quote above the anchor), asks round up.
//!
//! Arithmetic is exact decimal throughout. Binary floats never touch prices
//! or sizes; they are acceptable only in log output.

use super::types::Side;
use rust_decimal::Decimal;

/// Per-market quantization grid.
///
/// Holds the price quantum (`tick_jump`) and the size quantum
/// (`min_order_size`, the "lot"). Both must be strictly positive; the
/// config layer validates this before a grid is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickGrid {
    tick_jump: Decimal,
    lot: Decimal,
}

impl TickGrid {
    pub fn new(tick_jump: Decimal, lot: Decimal) -> Self {
        debug_assert!(tick_jump > Decimal::ZERO);
        debug_assert!(lot > Decimal::ZERO);
        Self { tick_jump, lot }
    }

    #[inline]
    pub fn tick_jump(&self) -> Decimal {
        self.tick_jump
    }

    #[inline]
    pub fn lot(&self) -> Decimal {
        self.lot
    }

    /// Largest grid price `<= value`.
    pub fn floor_price(&self, value: Decimal) -> Decimal {
        (value / self.tick_jump).floor() * self.tick_jump
    }

    /// Smallest grid price `>= value`.
    pub fn ceil_price(&self, value: Decimal) -> Decimal {
        (value / self.tick_jump).ceil() * self.tick_jump
    }

    /// Quantize an anchor price toward the passive direction of `side`:
    /// floor for bids, ceil for asks.
    pub fn align_price(&self, side: Side, value: Decimal) -> Decimal {
        match side {
            Side::Bid => self.floor_price(value),
            Side::Ask => self.ceil_price(value),
        }
    }

    /// Largest lot multiple `<= size`. Sizes below one lot floor to zero.
    pub fn floor_size(&self, size: Decimal) -> Decimal {
        (size / self.lot).floor() * self.lot
    }

    /// Whether `price` sits exactly on the grid.
    pub fn is_aligned(&self, price: Decimal) -> bool {
        let steps = price / self.tick_jump;
        steps == steps.floor()
    }
}
