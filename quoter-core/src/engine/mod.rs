//! Quote engine: event demultiplexer and owner of all core state
//!
//! One `MakerEngine` owns both ladders, the position/limit bookkeeping, the
//! readiness flags, and the market state. It is driven by exactly two kinds
//! of input, delivered serially over one channel:
//!
//! - raw venue frames (`user_data` / `market_data` streams), and
//! - reference prices extracted from the external feed.
//!
//! The engine never blocks: every handler runs to completion, queues its
//! outbound requests through the [`VenueAdapter`], and flushes them as one
//! batch. Nothing here is shared across threads; the single event channel
//! is the only synchronization point in the whole system.
//!
//! # Readiness gating
//!
//! The engine starts inactive and only begins quoting once all four of
//! these have been observed: the money balance, the open-order list, the
//! position snapshot (all from the `user_data` partial), and the execution
//! band (from the `market_data` partial). Until then venue events still
//! mutate order and position state, but no quotes are emitted.

use crate::config::MarketConfig;
use crate::core::{ExecutionBand, FatalError, Order, OrderState, Side};
use crate::ladder::{ReconcileParams, SideLadder};
use crate::model::{ModelParams, QuoteModel};
use crate::venue::{
    parse_venue_message, ExecutionKind, OrderEventKind, UserDataPartial, VenueAdapter,
    VenueEvent,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Input to the engine's single event loop.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// One raw frame from the venue stream.
    Venue(String),
    /// One price extracted from the reference feed.
    Reference(Decimal),
}

/// The market-making agent.
pub struct MakerEngine<V: VenueAdapter> {
    venue: V,
    cfg: MarketConfig,
    model_params: ModelParams,
    reconcile_params: ReconcileParams,

    bids: SideLadder,
    asks: SideLadder,

    // Market state
    last_auction_id: u64,
    execution_band: Option<ExecutionBand>,

    // User state
    has_user_balance: bool,
    balance_available: Decimal,
    balance_frozen: Decimal,
    has_old_orders: bool,
    has_user_position: bool,
    position: Decimal,
    position_entry_price: Decimal,
    position_liquidation_price: Decimal,
    position_total_margin: Decimal,
    position_funding: Decimal,

    // Quoting state
    active: bool,
    last_reference_price: Option<Decimal>,
    model: Option<QuoteModel>,
}

impl<V: VenueAdapter> MakerEngine<V> {
    pub fn new(cfg: MarketConfig, venue: V) -> Self {
        let grid = cfg.grid();
        let bids = SideLadder::new(Side::Bid, cfg.orders_per_side, grid, cfg.max_position);
        let asks = SideLadder::new(Side::Ask, cfg.orders_per_side, grid, cfg.max_position);
        let model_params = cfg.model_params();
        let reconcile_params = cfg.reconcile_params();
        Self {
            venue,
            cfg,
            model_params,
            reconcile_params,
            bids,
            asks,
            last_auction_id: 0,
            execution_band: None,
            has_user_balance: false,
            balance_available: Decimal::ZERO,
            balance_frozen: Decimal::ZERO,
            has_old_orders: false,
            has_user_position: false,
            position: Decimal::ZERO,
            position_entry_price: Decimal::ZERO,
            position_liquidation_price: Decimal::ZERO,
            position_total_margin: Decimal::ZERO,
            position_funding: Decimal::ZERO,
            active: false,
            last_reference_price: None,
            model: None,
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn position(&self) -> Decimal {
        self.position
    }

    pub fn balance_available(&self) -> Decimal {
        self.balance_available
    }

    pub fn balance_frozen(&self) -> Decimal {
        self.balance_frozen
    }

    pub fn last_auction_id(&self) -> u64 {
        self.last_auction_id
    }

    pub fn position_entry_price(&self) -> Decimal {
        self.position_entry_price
    }

    pub fn position_liquidation_price(&self) -> Decimal {
        self.position_liquidation_price
    }

    pub fn position_total_margin(&self) -> Decimal {
        self.position_total_margin
    }

    pub fn position_funding(&self) -> Decimal {
        self.position_funding
    }

    pub fn execution_band(&self) -> Option<ExecutionBand> {
        self.execution_band
    }

    pub fn model(&self) -> Option<QuoteModel> {
        self.model
    }

    pub fn bids(&self) -> &SideLadder {
        &self.bids
    }

    pub fn asks(&self) -> &SideLadder {
        &self.asks
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    fn is_ready(&self) -> bool {
        self.has_user_balance
            && self.has_old_orders
            && self.has_user_position
            && self.execution_band.is_some()
    }

    // ------------------------------------------------------------------
    // Event entry points
    // ------------------------------------------------------------------

    /// Drive the engine with one event from the main channel.
    pub fn handle_event(&mut self, event: EngineEvent) -> Result<(), FatalError> {
        match event {
            EngineEvent::Venue(raw) => self.on_venue_message(&raw),
            EngineEvent::Reference(price) => self.on_reference_price(price),
        }
    }

    /// Parse and apply one raw venue frame. Protocol-level problems are
    /// logged and the frame dropped; only state inconsistencies escape.
    pub fn on_venue_message(&mut self, raw: &str) -> Result<(), FatalError> {
        match parse_venue_message(raw) {
            Ok(event) => self.on_venue_event(event),
            Err(err) => {
                warn!(%err, "dropping venue frame");
                Ok(())
            }
        }
    }

    pub fn on_venue_event(&mut self, event: VenueEvent) -> Result<(), FatalError> {
        match event {
            VenueEvent::UserDataPartial(partial) => self.apply_user_data_partial(partial),
            VenueEvent::MarketDataPartial { execution_band } => {
                info!(
                    low = %execution_band.low,
                    high = %execution_band.high,
                    "execution band loaded"
                );
                self.execution_band = Some(execution_band);
                Ok(())
            }
            VenueEvent::AuctionUpdate {
                auction_id,
                execution_band,
            } => {
                self.apply_auction_update(auction_id, execution_band);
                Ok(())
            }
            VenueEvent::OrderLifecycle {
                kind,
                client_order_id,
            } => self.apply_order_event(kind, client_order_id),
            VenueEvent::Execution {
                kind,
                client_order_id,
                execution_amount,
                side,
            } => self.apply_execution(kind, client_order_id, execution_amount, side),
            VenueEvent::Noise => Ok(()),
        }
    }

    /// Apply one reference-price sample: recompute the model, activate if
    /// newly ready, and reconcile both ladders.
    pub fn on_reference_price(&mut self, price: Decimal) -> Result<(), FatalError> {
        if price <= Decimal::ZERO {
            warn!(%price, "ignoring non-positive reference price");
            return Ok(());
        }
        self.last_reference_price = Some(price);

        if !self.active && self.is_ready() {
            self.active = true;
            info!(
                position = %self.position,
                bid_limit = %self.bids.available_limit(),
                ask_limit = %self.asks.available_limit(),
                "activating"
            );
        }

        if self.active {
            self.refresh_model();
            self.update_orders();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Venue event handlers
    // ------------------------------------------------------------------

    fn apply_auction_update(
        &mut self,
        auction_id: u64,
        execution_band: Option<ExecutionBand>,
    ) {
        if self.last_auction_id != 0 && auction_id != self.last_auction_id + 1 {
            warn!(
                auction_id,
                last_auction_id = self.last_auction_id,
                "non-sequential auction id"
            );
        }
        // The sequence is advisory; it tracks forward and never regresses.
        if auction_id > self.last_auction_id {
            self.last_auction_id = auction_id;
        }
        if let Some(band) = execution_band {
            self.execution_band = Some(band);
        }
    }

    fn apply_user_data_partial(
        &mut self,
        partial: UserDataPartial,
    ) -> Result<(), FatalError> {
        let mut found_money_balance = false;
        for balance in &partial.balance {
            if balance.asset == self.cfg.money_asset {
                self.balance_available = balance.available;
                self.balance_frozen = balance.frozen;
                found_money_balance = true;
            }
        }
        if !found_money_balance {
            warn!(
                asset = %self.cfg.money_asset,
                "no money balance in user_data partial"
            );
            return Ok(());
        }
        self.has_user_balance = true;

        if !partial.orders.is_empty() {
            info!(count = partial.orders.len(), "found pre-existing orders");
        }
        self.has_old_orders = true;

        let mut found_symbol_position = false;
        for position in &partial.positions {
            if position.market == self.cfg.market {
                if !self.position.is_zero() {
                    return Err(FatalError::PositionSnapshotConflict {
                        current: self.position,
                    });
                }
                self.position = position.amount;
                // The snapshot position consumes headroom on the side it
                // leans toward and frees it on the other.
                if position.amount >= Decimal::ZERO {
                    self.bids.debit_limit(position.amount);
                    self.asks.credit_limit(position.amount);
                } else {
                    self.bids.credit_limit(-position.amount);
                    self.asks.debit_limit(-position.amount);
                }
                self.position_entry_price = position.entry_price;
                self.position_liquidation_price = position.liquidation_price;
                self.position_total_margin = position.total_margin;
                self.position_funding = position.funding;
                found_symbol_position = true;
            }
        }
        if !found_symbol_position {
            warn!(market = %self.cfg.market, "no position in user_data partial");
            self.position = Decimal::ZERO;
        }
        self.has_user_position = true;
        info!(
            position = %self.position,
            balance = %self.balance_available,
            "user_data snapshot applied"
        );

        // Whatever survived a previous session is stale; clear the book
        // before quoting anything of our own.
        for old_order in &partial.orders {
            info!(
                client_id = old_order.client_order_id,
                side = %old_order.side,
                amount = %old_order.amount,
                price = %old_order.price,
                "->CAN stale order"
            );
            self.venue.cancel(old_order.client_order_id);
        }
        self.venue.flush_batch();
        Ok(())
    }

    fn apply_order_event(
        &mut self,
        kind: OrderEventKind,
        client_order_id: u64,
    ) -> Result<(), FatalError> {
        let last_auction_id = self.last_auction_id;
        let Some(order) = self.find_order(client_order_id) else {
            warn!(
                client_order_id,
                event = ?kind,
                "lifecycle event for unknown order"
            );
            return Ok(());
        };
        match kind {
            OrderEventKind::Acknowledge => {
                order.on_ack();
                debug!(
                    client_order_id,
                    sent_at = order.auction_id_send,
                    received_at = last_auction_id,
                    "order acknowledged"
                );
            }
            OrderEventKind::Maker => order.on_maker(),
            OrderEventKind::Active => order.on_active(),
            OrderEventKind::Delete | OrderEventKind::AbortCreate => {
                let cancel_sent_at = order.auction_id_cancel;
                order.on_remove();
                debug!(
                    client_order_id,
                    cancel_sent_at,
                    received_at = last_auction_id,
                    "order removed"
                );
            }
            OrderEventKind::Reject => order.on_reject(),
            OrderEventKind::RejectCancel => order.on_cancel_reject()?,
        }
        Ok(())
    }

    fn apply_execution(
        &mut self,
        kind: ExecutionKind,
        client_order_id: Option<u64>,
        execution_amount: Decimal,
        side: Side,
    ) -> Result<(), FatalError> {
        if let Some(client_order_id) = client_order_id {
            match self.find_order(client_order_id) {
                None => warn!(
                    client_order_id,
                    event = ?kind,
                    "execution for unknown order"
                ),
                Some(order) => {
                    match kind {
                        ExecutionKind::MakerTrade => {
                            if order.state != OrderState::Maker
                                && order.state != OrderState::Active
                            {
                                warn!(
                                    client_order_id,
                                    state = %order.state,
                                    "maker_trade on order not resting"
                                );
                            }
                        }
                        ExecutionKind::TakerTrade => {
                            if order.state != OrderState::Acked
                                && order.state != OrderState::Active
                            {
                                warn!(
                                    client_order_id,
                                    state = %order.state,
                                    "taker_trade on order not acked"
                                );
                            }
                        }
                        // Forced executions carry no lifecycle expectation.
                        ExecutionKind::Liquidation | ExecutionKind::AutoDeleverage => {}
                    }
                    order.apply_trade(execution_amount)?;
                }
            }
        }

        // Inventory moves regardless of whether the execution hit one of
        // our tracked orders. Headroom is debited on the filled side at
        // fill time and freed on the opposite side.
        match side {
            Side::Bid => {
                self.position += execution_amount;
                self.bids.debit_limit(execution_amount);
                self.asks.credit_limit(execution_amount);
            }
            Side::Ask => {
                self.position -= execution_amount;
                self.asks.debit_limit(execution_amount);
                self.bids.credit_limit(execution_amount);
            }
        }
        debug!(
            %side,
            amount = %execution_amount,
            position = %self.position,
            "execution applied"
        );

        // The fair price leans with inventory, so fills re-anchor the
        // ladders even between reference ticks.
        if self.active {
            self.refresh_model();
            self.update_orders();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Quoting
    // ------------------------------------------------------------------

    fn refresh_model(&mut self) {
        if let Some(reference_price) = self.last_reference_price {
            self.model = Some(QuoteModel::from_reference(
                reference_price,
                self.position,
                &self.model_params,
            ));
        }
    }

    /// Re-anchor both ladders and run one reconciliation pass, dispatching
    /// the resulting requests as a single batch.
    fn update_orders(&mut self) {
        let Some(model) = self.model else {
            return;
        };
        let Some(band) = self.execution_band else {
            return;
        };
        let params = self.reconcile_params;
        let last_auction_id = self.last_auction_id;

        self.bids.set_new_price(model.anchor(Side::Bid, &band));
        self.asks.set_new_price(model.anchor(Side::Ask, &band));

        self.bids
            .reconcile(&model, &params, last_auction_id, &mut self.venue);
        self.asks
            .reconcile(&model, &params, last_auction_id, &mut self.venue);

        self.venue.flush_batch();
    }

    fn find_order(&mut self, client_order_id: u64) -> Option<&mut Order> {
        if self.bids.find_by_client_id(client_order_id).is_some() {
            return self.bids.find_by_client_id(client_order_id);
        }
        self.asks.find_by_client_id(client_order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingVenue;
    use rust_decimal_macros::dec;

    fn test_config() -> MarketConfig {
        let mut cfg = MarketConfig::preset("ETH").unwrap();
        cfg.market = "ETH-PERP".to_string();
        cfg.orders_per_side = 3;
        cfg
    }

    fn engine() -> MakerEngine<RecordingVenue> {
        MakerEngine::new(test_config(), RecordingVenue::new())
    }

    fn band_event() -> VenueEvent {
        VenueEvent::MarketDataPartial {
            execution_band: ExecutionBand {
                low: dec!(1980),
                high: dec!(2020),
            },
        }
    }

    fn empty_partial() -> VenueEvent {
        VenueEvent::UserDataPartial(UserDataPartial {
            balance: vec![crate::venue::BalanceEntry {
                asset: "USD".to_string(),
                available: dec!(1000),
                frozen: dec!(0),
            }],
            orders: vec![],
            positions: vec![crate::venue::PositionEntry {
                market: "ETH-PERP".to_string(),
                amount: dec!(0),
                funding: dec!(0),
                entry_price: dec!(0),
                liquidation_price: dec!(0),
                total_margin: dec!(0),
            }],
        })
    }

    #[test]
    fn stays_inactive_until_all_flags_are_set() {
        let mut engine = engine();
        engine.on_reference_price(dec!(2000)).unwrap();
        assert!(!engine.is_active());
        assert!(engine.venue().placed().is_empty());

        engine.on_venue_event(empty_partial()).unwrap();
        engine.on_reference_price(dec!(2000)).unwrap();
        assert!(!engine.is_active());

        engine.on_venue_event(band_event()).unwrap();
        engine.on_reference_price(dec!(2000)).unwrap();
        assert!(engine.is_active());
        assert_eq!(engine.venue().placed().len(), 6);
    }

    #[test]
    fn auction_sequence_tracks_forward_and_logs_gaps() {
        let mut engine = engine();
        engine
            .on_venue_event(VenueEvent::AuctionUpdate {
                auction_id: 10,
                execution_band: None,
            })
            .unwrap();
        assert_eq!(engine.last_auction_id(), 10);

        // Gap: warned about, but the sequence still moves forward and the
        // band payload is absorbed.
        engine
            .on_venue_event(VenueEvent::AuctionUpdate {
                auction_id: 13,
                execution_band: Some(ExecutionBand {
                    low: dec!(1990),
                    high: dec!(2010),
                }),
            })
            .unwrap();
        assert_eq!(engine.last_auction_id(), 13);
        assert_eq!(
            engine.execution_band(),
            Some(ExecutionBand {
                low: dec!(1990),
                high: dec!(2010),
            })
        );

        // A stale replay never regresses the sequence.
        engine
            .on_venue_event(VenueEvent::AuctionUpdate {
                auction_id: 11,
                execution_band: None,
            })
            .unwrap();
        assert_eq!(engine.last_auction_id(), 13);
    }

    #[test]
    fn unknown_lifecycle_events_are_tolerated() {
        let mut engine = engine();
        engine
            .on_venue_event(VenueEvent::OrderLifecycle {
                kind: OrderEventKind::Acknowledge,
                client_order_id: 999,
            })
            .unwrap();
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut engine = engine();
        engine.on_venue_message("not json at all").unwrap();
        engine
            .on_venue_message(r#"{"topic":"user_data","event":"mystery","payload":{}}"#)
            .unwrap();
    }

    #[test]
    fn snapshot_position_consumes_headroom() {
        let mut engine = engine();
        engine
            .on_venue_event(VenueEvent::UserDataPartial(UserDataPartial {
                balance: vec![crate::venue::BalanceEntry {
                    asset: "USD".to_string(),
                    available: dec!(1000),
                    frozen: dec!(0),
                }],
                orders: vec![],
                positions: vec![crate::venue::PositionEntry {
                    market: "ETH-PERP".to_string(),
                    amount: dec!(25),
                    funding: dec!(0),
                    entry_price: dec!(1990),
                    liquidation_price: dec!(100),
                    total_margin: dec!(500),
                }],
            }))
            .unwrap();
        assert_eq!(engine.position(), dec!(25));
        assert_eq!(engine.bids().available_limit(), dec!(75));
        assert_eq!(engine.asks().available_limit(), dec!(125));
    }

    #[test]
    fn second_position_snapshot_is_fatal() {
        let mut engine = engine();
        let snapshot = || {
            VenueEvent::UserDataPartial(UserDataPartial {
                balance: vec![crate::venue::BalanceEntry {
                    asset: "USD".to_string(),
                    available: dec!(1000),
                    frozen: dec!(0),
                }],
                orders: vec![],
                positions: vec![crate::venue::PositionEntry {
                    market: "ETH-PERP".to_string(),
                    amount: dec!(25),
                    funding: dec!(0),
                    entry_price: dec!(1990),
                    liquidation_price: dec!(100),
                    total_margin: dec!(500),
                }],
            })
        };
        engine.on_venue_event(snapshot()).unwrap();
        let err = engine.on_venue_event(snapshot()).unwrap_err();
        assert!(matches!(err, FatalError::PositionSnapshotConflict { .. }));
    }

    #[test]
    fn stale_orders_from_snapshot_are_cancelled() {
        let mut engine = engine();
        engine
            .on_venue_event(VenueEvent::UserDataPartial(UserDataPartial {
                balance: vec![crate::venue::BalanceEntry {
                    asset: "USD".to_string(),
                    available: dec!(1000),
                    frozen: dec!(0),
                }],
                orders: vec![
                    crate::venue::OpenOrder {
                        client_order_id: 71,
                        amount: dec!(1.0),
                        price: dec!(1990),
                        side: Side::Bid,
                        market: "ETH-PERP".to_string(),
                    },
                    crate::venue::OpenOrder {
                        client_order_id: 72,
                        amount: dec!(1.0),
                        price: dec!(2010),
                        side: Side::Ask,
                        market: "ETH-PERP".to_string(),
                    },
                ],
                positions: vec![crate::venue::PositionEntry {
                    market: "ETH-PERP".to_string(),
                    amount: dec!(0),
                    funding: dec!(0),
                    entry_price: dec!(0),
                    liquidation_price: dec!(0),
                    total_margin: dec!(0),
                }],
            }))
            .unwrap();
        assert_eq!(engine.venue().cancelled(), vec![71, 72]);
        // Dispatched as one batch.
        assert_eq!(engine.venue().flushed.len(), 1);
    }

    #[test]
    fn untracked_execution_still_moves_position() {
        let mut engine = engine();
        engine
            .on_venue_event(VenueEvent::Execution {
                kind: ExecutionKind::Liquidation,
                client_order_id: None,
                execution_amount: dec!(3.0),
                side: Side::Ask,
            })
            .unwrap();
        assert_eq!(engine.position(), dec!(-3.0));
        assert_eq!(engine.asks().available_limit(), dec!(97));
        assert_eq!(engine.bids().available_limit(), dec!(103));
    }
}
