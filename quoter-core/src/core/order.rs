//! Order lifecycle state machine
//!
//! One `Order` is one reusable slot in a side ladder. It is created EMPTY,
//! walks through the venue-driven lifecycle below, and returns to EMPTY on
//! full fill or confirmed cancel so the slot can be reused.
//!
//! # State diagram
//!
//! ```text
//!  EMPTY ──send_new──▶ PENDING ──ack──▶ ACKED ──maker──▶ MAKER
//!    ▲                    │                │                │ ▲
//!    │                reject /          active           active │ maker
//!    │              abort_create          │                │   │ (auction ends)
//!    │                    │               ▼                ▼   │
//!    │                    │             ACTIVE ◀───────────────┘
//!    │                    │
//!    ◀────────────────────┘
//!
//!  {ACKED, MAKER, ACTIVE} ── trade(partial) ──▶ same state, amount_left shrinks
//!  {ACKED, MAKER, ACTIVE} ── trade(full)    ──▶ EMPTY
//!  any non-EMPTY ── send_cancel ──▶ same state, cancel := PENDING
//!  cancel PENDING ── delete ──▶ EMPTY
//!  cancel PENDING ── reject_cancel ──▶ cancel := NORMAL, retries += 1
//! ```
//!
//! # Tolerance contract
//!
//! Transitions are driven by venue messages, which may arrive out of order,
//! duplicated, or retried. An event that does not match its precondition is
//! logged as a warning but never panics: the state advances only when the
//! event is strictly more progressed than what we hold (an `ack` landing
//! after `maker` does not regress the order), and removal-class events
//! (reject, delete, abort) always clear the slot.
//!
//! Two things are not tolerated and surface as [`FatalError`]: an execution
//! larger than `amount_left`, and a cancel rejected [`MAX_CANCEL_RETRIES`]
//! times while the order is live on the book.

use super::errors::FatalError;
use super::types::Side;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Instant;

/// Cancel attempts tolerated before the order is declared unkillable.
pub const MAX_CANCEL_RETRIES: u32 = 50;

/// Venue-visible lifecycle state of an order slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Slot is free; no order is associated with it.
    Empty,
    /// Sent to the venue, not yet acknowledged.
    Pending,
    /// Acknowledged, not yet resting on the book.
    Acked,
    /// Resting on the book as a maker order.
    Maker,
    /// Participating in the current auction match.
    Active,
}

impl OrderState {
    /// Short code used in ladder dumps.
    pub fn code(&self) -> &'static str {
        match self {
            OrderState::Empty => "   ",
            OrderState::Pending => "pen",
            OrderState::Acked => "ack",
            OrderState::Maker => "mak",
            OrderState::Active => "act",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code().trim())
    }
}

/// Whether a cancel request is in flight for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    Normal,
    Pending,
}

/// Result of applying an execution report to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Order still has quantity left on the book.
    Partial,
    /// Order fully consumed; the slot has been cleared.
    Filled,
}

/// One order slot.
///
/// Invariants (hold between event applications):
/// - `amount_left <= total_amount`
/// - `state == Empty` ⇔ `client_id == None && price == None && total_amount == 0`
#[derive(Debug, Clone)]
pub struct Order {
    pub client_id: Option<u64>,
    pub side: Side,
    pub price: Option<Decimal>,
    pub total_amount: Decimal,
    pub amount_left: Decimal,
    pub state: OrderState,
    pub cancel: CancelState,
    pub cancel_retries: u32,
    /// Venue auction sequence observed when the new-order request was issued.
    pub auction_id_send: u64,
    /// Venue auction sequence observed when the cancel request was issued.
    pub auction_id_cancel: u64,
    pub last_send_time: Option<Instant>,
}

impl Order {
    pub fn new(side: Side) -> Self {
        Self {
            client_id: None,
            side,
            price: None,
            total_amount: Decimal::ZERO,
            amount_left: Decimal::ZERO,
            state: OrderState::Empty,
            cancel: CancelState::Normal,
            cancel_retries: 0,
            auction_id_send: 0,
            auction_id_cancel: 0,
            last_send_time: None,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state == OrderState::Empty
    }

    fn id_for_log(&self) -> u64 {
        self.client_id.unwrap_or(0)
    }

    /// Reset the slot to EMPTY. The side is retained; everything else is
    /// wiped so the slot can be reused for a fresh order.
    pub fn clear(&mut self) {
        self.state = OrderState::Empty;
        self.cancel = CancelState::Normal;
        self.cancel_retries = 0;
        self.total_amount = Decimal::ZERO;
        self.amount_left = Decimal::ZERO;
        self.client_id = None;
        self.price = None;
    }

    // ------------------------------------------------------------------
    // Outbound registrations (called by the ladder when it emits requests)
    // ------------------------------------------------------------------

    /// Mark the slot as holding a freshly sent order.
    pub fn register_new(
        &mut self,
        client_id: u64,
        amount: Decimal,
        price: Decimal,
        auction_id: u64,
    ) {
        debug_assert!(self.is_empty());
        self.state = OrderState::Pending;
        self.cancel = CancelState::Normal;
        self.client_id = Some(client_id);
        self.total_amount = amount;
        self.amount_left = amount;
        self.price = Some(price);
        self.auction_id_send = auction_id;
        self.last_send_time = Some(Instant::now());
    }

    /// Mark a cancel as in flight.
    pub fn register_cancel(&mut self, auction_id: u64) {
        debug_assert!(self.cancel == CancelState::Normal);
        self.cancel = CancelState::Pending;
        self.auction_id_cancel = auction_id;
    }

    // ------------------------------------------------------------------
    // Inbound venue events
    // ------------------------------------------------------------------

    /// `acknowledge_order`: PENDING → ACKED.
    pub fn on_ack(&mut self) {
        match self.state {
            OrderState::Pending => self.state = OrderState::Acked,
            OrderState::Empty => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "received acknowledge for an empty slot, ignoring"
                );
            }
            state => {
                // Duplicate or late ack; the order already progressed past
                // ACKED and must not regress.
                tracing::warn!(
                    client_id = self.id_for_log(),
                    state = %state,
                    "received acknowledge, but order is not pending"
                );
            }
        }
    }

    /// `reject_order`: the new-order request was refused; free the slot.
    pub fn on_reject(&mut self) {
        if self.state != OrderState::Pending {
            tracing::warn!(
                client_id = self.id_for_log(),
                state = %self.state,
                "received reject, but order is not pending"
            );
        }
        self.clear();
    }

    /// `maker_order`: the order is resting on the book.
    pub fn on_maker(&mut self) {
        match self.state {
            OrderState::Acked | OrderState::Active => self.state = OrderState::Maker,
            OrderState::Pending => {
                // Out-of-order delivery: maker confirmation overtook the ack.
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "received maker_order while still pending"
                );
                self.state = OrderState::Maker;
            }
            OrderState::Maker => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "duplicate maker_order, ignoring"
                );
            }
            OrderState::Empty => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "received maker_order for an empty slot, ignoring"
                );
            }
        }
    }

    /// `active_order`: the order entered the auction match.
    pub fn on_active(&mut self) {
        match self.state {
            OrderState::Maker => self.state = OrderState::Active,
            OrderState::Acked => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "active_order straight from acked, is the venue pushing execution bands?"
                );
                self.state = OrderState::Active;
            }
            OrderState::Pending => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "received active_order while still pending"
                );
                self.state = OrderState::Active;
            }
            OrderState::Active => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "duplicate active_order, ignoring"
                );
            }
            OrderState::Empty => {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    "received active_order for an empty slot, ignoring"
                );
            }
        }
    }

    /// `delete_order` / `abort_create`: the venue confirmed removal.
    pub fn on_remove(&mut self) {
        if self.cancel != CancelState::Pending {
            tracing::warn!(
                client_id = self.id_for_log(),
                state = %self.state,
                "received remove without a cancel in flight"
            );
        }
        self.clear();
    }

    /// `reject_cancel`: the cancel request was refused.
    ///
    /// The retry counter is bumped and the cancel flag dropped so the next
    /// reconciliation pass can try again. A PENDING order that accumulates
    /// [`MAX_CANCEL_RETRIES`] rejections is assumed never to have reached the
    /// venue and is freed; a live order in the same situation is a fatal
    /// inconsistency.
    pub fn on_cancel_reject(&mut self) -> Result<(), FatalError> {
        if self.cancel == CancelState::Normal {
            tracing::warn!(
                client_id = self.id_for_log(),
                "received reject_cancel, but order was not waiting for cancel"
            );
        }
        self.cancel_retries += 1;

        if self.cancel_retries >= MAX_CANCEL_RETRIES {
            if self.state == OrderState::Pending {
                tracing::warn!(
                    client_id = self.id_for_log(),
                    retries = self.cancel_retries,
                    "cancel rejected repeatedly while still pending, assuming the order was never sent"
                );
                self.clear();
                return Ok(());
            }
            return Err(FatalError::CancelRetriesExhausted {
                client_id: self.id_for_log(),
                retries: self.cancel_retries,
            });
        }

        self.cancel = CancelState::Normal;
        Ok(())
    }

    /// Apply an execution report.
    ///
    /// Reduces `amount_left`; a full fill clears the slot. An execution
    /// larger than what is left means our book view has diverged from the
    /// venue's and is fatal.
    pub fn apply_trade(&mut self, execution_amount: Decimal) -> Result<TradeOutcome, FatalError> {
        if execution_amount > self.amount_left {
            return Err(FatalError::TradeOverfill {
                client_id: self.id_for_log(),
                executed: execution_amount,
                left: self.amount_left,
            });
        }
        self.amount_left -= execution_amount;
        if self.amount_left.is_zero() {
            self.clear();
            Ok(TradeOutcome::Filled)
        } else {
            Ok(TradeOutcome::Partial)
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(
            f,
            "{} {}/{} @ {} ({}) [{}]{}",
            self.side,
            self.amount_left,
            self.total_amount,
            self.price.unwrap_or_default(),
            self.id_for_log(),
            self.state.code(),
            match self.cancel {
                CancelState::Normal => " ",
                CancelState::Pending => "x",
            }
        )
    }
}
