//! Side ladder: ring buffer of order slots plus the reconciliation sweep
//!
//! Each side of the book keeps `2N` order slots in a circular array. The
//! logical index of the best rung, `top_order`, moves with the anchor price:
//! a one-tick shift tightens or loosens the ladder by rotating the ring
//! *logically* while physical slots stay put, so resting orders keep their
//! assigned prices until they are cancelled.
//!
//! ```text
//!            top_order = 4                      top_order = 3 (price rose, BID)
//!   logical:  0  1  2  3  4  5        logical:  0  1  2  3  4  5
//!   physical [4][5][0][1][2][3]  ──▶  physical [3][4][5][0][1][2]
//!             ▲ best rung                       ▲ new best rung, same slots
//! ```
//!
//! Reconciliation walks the ring from the top and compares each rung's
//! resting size against the target cumulative liquidity curve, issuing
//! cancels and placements through the [`VenueAdapter`] borrow handed in by
//! the engine. Slots are mutated as requests are issued (PENDING sends,
//! PENDING cancels) so the running counters observe this pass's own output.

use crate::core::{CancelState, Order, Side, TickGrid};
use crate::model::QuoteModel;
use crate::venue::{PlaceOrder, VenueAdapter};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Instant;
use tracing::{debug, warn};

/// Per-pass limits lifted out of the market config.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileParams {
    /// Per-side resting size cap.
    pub max_liquidity: Decimal,
    /// Upper bound per placement.
    pub max_order_size: Decimal,
    /// Tolerated fraction of the target curve before topping a rung up.
    pub hysteresis_low: Decimal,
    /// Floor fraction below which a rung is cancelled to be replaced with a
    /// larger order.
    pub hysteresis_min: Decimal,
    /// Venue leverage parameter, passed through on placements.
    pub leverage: u32,
}

/// One side of the quote ladder.
#[derive(Debug)]
pub struct SideLadder {
    side: Side,
    target_num_orders: usize,
    max_orders: usize,
    grid: TickGrid,
    available_limit: Decimal,
    /// Logical index of the best rung; the physical slot is
    /// `top_order mod max_orders`. Unbounded: rotations accumulate.
    top_order: i64,
    old_top_order: i64,
    top_price: Option<Decimal>,
    old_top_price: Option<Decimal>,
    orders: Vec<Order>,
    last_status_time: Option<Instant>,
}

impl SideLadder {
    pub fn new(
        side: Side,
        target_num_orders: usize,
        grid: TickGrid,
        available_limit: Decimal,
    ) -> Self {
        let max_orders = 2 * target_num_orders;
        Self {
            side,
            target_num_orders,
            max_orders,
            grid,
            available_limit,
            top_order: 0,
            old_top_order: 0,
            top_price: None,
            old_top_price: None,
            orders: (0..max_orders).map(|_| Order::new(side)).collect(),
            last_status_time: None,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    #[inline]
    pub fn top_price(&self) -> Option<Decimal> {
        self.top_price
    }

    #[inline]
    pub fn target_num_orders(&self) -> usize {
        self.target_num_orders
    }

    #[inline]
    pub fn available_limit(&self) -> Decimal {
        self.available_limit
    }

    /// All physical slots, in ring order.
    pub fn slots(&self) -> &[Order] {
        &self.orders
    }

    /// Slot at logical rung `i` (0 = best).
    pub fn rung(&self, i: usize) -> &Order {
        &self.orders[self.slot(self.top_order + i as i64)]
    }

    fn slot(&self, logical: i64) -> usize {
        logical.rem_euclid(self.max_orders as i64) as usize
    }

    pub fn find_by_client_id(&mut self, client_id: u64) -> Option<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.client_id == Some(client_id))
    }

    /// Sum of `amount_left` over all non-EMPTY slots.
    pub fn resting_liquidity(&self) -> Decimal {
        self.orders
            .iter()
            .filter(|o| !o.is_empty())
            .map(|o| o.amount_left)
            .sum()
    }

    /// Number of non-EMPTY slots with no cancel in flight.
    pub fn live_order_count(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| !o.is_empty() && o.cancel == CancelState::Normal)
            .count()
    }

    // ------------------------------------------------------------------
    // Inventory headroom
    // ------------------------------------------------------------------

    pub fn credit_limit(&mut self, amount: Decimal) {
        self.available_limit += amount;
    }

    pub fn debit_limit(&mut self, amount: Decimal) {
        self.available_limit -= amount;
        if self.available_limit < Decimal::ZERO {
            warn!(
                side = %self.side,
                limit = %self.available_limit,
                "available limit went negative, clamping"
            );
            self.available_limit = Decimal::ZERO;
        }
    }

    // ------------------------------------------------------------------
    // Price rotation
    // ------------------------------------------------------------------

    /// Re-anchor the ladder at a new raw price.
    ///
    /// The anchor is quantized onto the grid (floor for bids, ceil for
    /// asks), and `top_order` shifts by the signed tick distance so the
    /// ring rotates logically under the resting orders.
    pub fn set_new_price(&mut self, anchor: Decimal) {
        let new_top_price = self.grid.align_price(self.side, anchor);
        self.old_top_price = self.top_price;
        self.top_price = Some(new_top_price);
        self.old_top_order = self.top_order;
        if let Some(old_top_price) = self.old_top_price {
            let price_diff = new_top_price - old_top_price;
            let steps = (price_diff / self.grid.tick_jump()).to_i64().unwrap_or(0);
            self.top_order = self.old_top_order
                + match self.side {
                    Side::Bid => -steps,
                    Side::Ask => steps,
                };
        }
        debug!(
            side = %self.side,
            top_price = %new_top_price,
            old_top = self.old_top_order,
            new_top = self.top_order,
            "ladder re-anchored"
        );
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// One sweep over the ring, issuing cancels and placements to match the
    /// target liquidity curve.
    ///
    /// For each rung, with `expected` the capped cumulative target:
    /// - cancel a live order on price mismatch, when its remainder exceeds
    ///   `expected - (total - pending_cancel)`, or when the live-rung budget
    ///   is spent;
    /// - cancel-to-upsize a live order that fell under the minimum curve
    ///   (only while no cancel is already in flight on this side);
    /// - fill an empty rung when the gap to `expected * hysteresis_low`
    ///   exceeds one lot, sized against headroom and `max_order_size`.
    ///
    /// The sweep stops placing once the resting total approaches
    /// `max_liquidity` or the rung budget is used up; slots beyond that
    /// point are stale leftovers from rotation and are cancelled.
    pub fn reconcile<V: VenueAdapter>(
        &mut self,
        model: &QuoteModel,
        params: &ReconcileParams,
        last_auction_id: u64,
        venue: &mut V,
    ) {
        let Some(top_price) = self.top_price else {
            return;
        };

        debug!(
            side = %self.side,
            top_price = %top_price,
            old_top = self.old_top_order,
            new_top = self.top_order,
            available = %self.available_limit,
            "reconcile"
        );
        self.maybe_dump_ladder();

        let tick_jump = self.grid.tick_jump();
        let lot = self.grid.lot();
        let price_increment = match self.side {
            Side::Bid => -tick_jump,
            Side::Ask => tick_jump,
        };

        let mut price = top_price;
        let mut active_order_count = 0usize;
        let mut total_liquidity = Decimal::ZERO;
        let mut pending_cancel_liquidity = Decimal::ZERO;
        let mut visited = self.max_orders;

        for i in 0..self.max_orders {
            let index = self.slot(self.top_order + i as i64);

            // Rung distance from the fair price, in ticks, measured along
            // this side's direction. Rungs at or beyond the fair price
            // carry no target.
            let mut delta_ticks = (price - model.fair_price) / price_increment;
            delta_ticks =
                delta_ticks.round_dp_with_strategy(3, RoundingStrategy::ToZero);
            if delta_ticks < Decimal::ZERO {
                delta_ticks = Decimal::ZERO;
            }

            let expected_liquidity =
                (model.avg_tick_liquidity * delta_ticks).min(params.max_liquidity);

            let liquidity_excess =
                expected_liquidity - (total_liquidity - pending_cancel_liquidity);
            let liquidity_needed =
                expected_liquidity * params.hysteresis_low - total_liquidity;
            let liquidity_min_threshold = expected_liquidity * params.hysteresis_min
                - total_liquidity
                - model.avg_tick_liquidity;

            let (occupied, cancellable, order_price, amount_left) = {
                let order = &self.orders[index];
                (
                    !order.is_empty(),
                    order.cancel == CancelState::Normal,
                    order.price,
                    order.amount_left,
                )
            };

            if occupied && cancellable {
                if order_price != Some(price)
                    || amount_left > liquidity_excess
                    || active_order_count >= self.target_num_orders
                {
                    self.send_cancel(index, last_auction_id, venue);
                } else if liquidity_min_threshold > amount_left
                    && pending_cancel_liquidity.is_zero()
                    && amount_left < params.max_order_size
                {
                    // Under the minimum curve: clear the rung so the next
                    // pass can put a larger order there.
                    self.send_cancel(index, last_auction_id, venue);
                }
            }

            if self.orders[index].is_empty()
                && active_order_count < self.target_num_orders
                && liquidity_needed > lot
            {
                let size = liquidity_needed
                    .min(self.available_limit)
                    .min(params.max_order_size);
                let size = self.grid.floor_size(size);
                if size >= lot {
                    self.send_new(
                        index,
                        size,
                        price,
                        last_auction_id,
                        params.leverage,
                        venue,
                    );
                }
            }

            // Counters observe the slot after this pass's own sends.
            let order = &self.orders[index];
            if !order.is_empty() {
                active_order_count += 1;
                total_liquidity += order.amount_left;
                if order.cancel == CancelState::Pending {
                    pending_cancel_liquidity += order.amount_left;
                }
            }

            if total_liquidity + lot >= params.max_liquidity
                || active_order_count >= self.target_num_orders
            {
                visited = i + 1;
                break;
            }

            price += price_increment;
        }

        // Rungs beyond the sweep hold no quote in the target ladder; clear
        // out whatever the rotation left behind there.
        for i in visited..self.max_orders {
            let index = self.slot(self.top_order + i as i64);
            let order = &self.orders[index];
            if !order.is_empty() && order.cancel == CancelState::Normal {
                self.send_cancel(index, last_auction_id, venue);
            }
        }
    }

    fn send_new<V: VenueAdapter>(
        &mut self,
        index: usize,
        size: Decimal,
        price: Decimal,
        auction_id: u64,
        leverage: u32,
        venue: &mut V,
    ) {
        let client_id = venue.next_client_id();
        tracing::info!(
            side = %self.side,
            amount = %size,
            price = %price,
            client_id,
            "->NEW"
        );
        self.orders[index].register_new(client_id, size, price, auction_id);
        venue.place(PlaceOrder {
            client_order_id: client_id,
            side: self.side,
            amount: size,
            price,
            leverage,
        });
    }

    fn send_cancel<V: VenueAdapter>(&mut self, index: usize, auction_id: u64, venue: &mut V) {
        let order = &mut self.orders[index];
        let client_id = order.client_id.unwrap_or(0);
        tracing::info!(
            side = %self.side,
            amount_left = %order.amount_left,
            price = %order.price.unwrap_or_default(),
            client_id,
            "->CAN"
        );
        order.register_cancel(auction_id);
        venue.cancel(client_id);
    }

    /// Dump the ring at debug level, throttled to once per second.
    fn maybe_dump_ladder(&mut self) {
        let now = Instant::now();
        let due = self
            .last_status_time
            .map_or(true, |t| now.duration_since(t).as_secs_f64() > 1.0);
        if !due {
            return;
        }
        self.last_status_time = Some(now);
        for i in 0..self.max_orders {
            let index = self.slot(self.top_order + i as i64);
            let order = &self.orders[index];
            if !order.is_empty() {
                let age = order
                    .last_send_time
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(0.0);
                debug!(slot = index, age_secs = age, "{}", order);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelParams, QuoteModel};
    use crate::testing::RecordingVenue;
    use rust_decimal_macros::dec;

    fn grid() -> TickGrid {
        TickGrid::new(dec!(0.5), dec!(0.5))
    }

    fn params() -> ReconcileParams {
        ReconcileParams {
            max_liquidity: dec!(100),
            max_order_size: dec!(10),
            hysteresis_low: dec!(0.9),
            hysteresis_min: dec!(0.8),
            leverage: 10,
        }
    }

    fn model(reference: Decimal) -> QuoteModel {
        QuoteModel::from_reference(
            reference,
            Decimal::ZERO,
            &ModelParams {
                max_diff: dec!(0.004),
                max_position: dec!(100),
                tick_jump: dec!(0.5),
                spread: Decimal::ZERO,
            },
        )
    }

    #[test]
    fn first_anchor_does_not_rotate() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        ladder.set_new_price(dec!(2000.3));
        assert_eq!(ladder.top_price(), Some(dec!(2000.0)));
        assert_eq!(ladder.top_order, 0);
    }

    #[test]
    fn bid_rotation_negates_the_tick_shift() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        ladder.set_new_price(dec!(2000.0));
        ladder.set_new_price(dec!(2001.0));
        // Price rose two ticks: the best bid rung moved up, logical top
        // shifts down by two.
        assert_eq!(ladder.top_price(), Some(dec!(2001.0)));
        assert_eq!(ladder.top_order, -2);

        ladder.set_new_price(dec!(2000.0));
        assert_eq!(ladder.top_order, 0);
    }

    #[test]
    fn ask_rotation_follows_the_tick_shift() {
        let mut ladder = SideLadder::new(Side::Ask, 3, grid(), dec!(100));
        ladder.set_new_price(dec!(2000.0));
        ladder.set_new_price(dec!(2001.0));
        assert_eq!(ladder.top_order, 2);
    }

    #[test]
    fn negative_logical_indices_wrap() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        ladder.top_order = -1;
        assert_eq!(ladder.slot(-1), 5);
        assert_eq!(ladder.slot(-7), 5);
        assert_eq!(ladder.slot(4), 4);
    }

    #[test]
    fn cold_reconcile_builds_the_target_ladder() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        let mut venue = RecordingVenue::new();
        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &params(), 1, &mut venue);

        let placed = venue.placed();
        assert_eq!(placed.len(), 3);
        // Rung 0 sits on the fair price and carries no target; quoting
        // starts one tick below.
        assert_eq!(placed[0].price, dec!(1999.5));
        assert_eq!(placed[1].price, dec!(1999.0));
        assert_eq!(placed[2].price, dec!(1998.5));
        // avg_tick_liquidity is 6.25; the needed curve floors to lots.
        assert_eq!(placed[0].amount, dec!(5.5));
        assert!(venue.cancelled().is_empty());
    }

    #[test]
    fn reconcile_is_idempotent_within_hysteresis() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        let mut venue = RecordingVenue::new();
        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &params(), 1, &mut venue);
        venue.clear();

        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &params(), 2, &mut venue);
        assert!(venue.placed().is_empty());
        assert!(venue.cancelled().is_empty());
    }

    #[test]
    fn upward_shift_cancels_the_stale_bottom_rung() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        let mut venue = RecordingVenue::new();
        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &params(), 1, &mut venue);
        let bottom_id = venue.placed()[2].client_order_id;
        venue.clear();

        // Reference moves up one tick: a fresh rung opens at 2000.0 and the
        // old third rung at 1998.5 is now one past the budget.
        ladder.set_new_price(dec!(2000.5));
        ladder.reconcile(&model(dec!(2000.5)), &params(), 2, &mut venue);

        let placed = venue.placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].price, dec!(2000.0));
        assert_eq!(venue.cancelled(), vec![bottom_id]);
    }

    #[test]
    fn placement_respects_available_limit() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(1.6));
        let mut venue = RecordingVenue::new();
        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &params(), 1, &mut venue);

        // Headroom of 1.6 floors to three lots on the first rung.
        let placed = venue.placed();
        assert_eq!(placed[0].amount, dec!(1.5));
    }

    #[test]
    fn placement_respects_max_order_size() {
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(100));
        let mut venue = RecordingVenue::new();
        let mut p = params();
        p.max_order_size = dec!(2.0);
        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &p, 1, &mut venue);

        for order in venue.placed() {
            assert!(order.amount <= dec!(2.0));
        }
    }

    #[test]
    fn no_placement_below_one_lot() {
        // Tiny headroom: the floored size would be zero lots.
        let mut ladder = SideLadder::new(Side::Bid, 3, grid(), dec!(0.4));
        let mut venue = RecordingVenue::new();
        ladder.set_new_price(dec!(2000));
        ladder.reconcile(&model(dec!(2000)), &params(), 1, &mut venue);
        assert!(venue.placed().is_empty());
    }
}
