//! Fatal error taxonomy
//!
//! Everything recoverable (transport hiccups, protocol noise, tolerable
//! out-of-order lifecycle events) is logged and absorbed where it happens.
//! The variants below are the opposite: state inconsistencies for which the
//! only sane recovery is a restart and a fresh `user_data` snapshot, so they
//! propagate up to the binary and terminate the process.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The venue reported an execution larger than what the order has left.
    /// Our view of the order book and the venue's have diverged.
    #[error(
        "trade executes {executed} on order {client_id}, but only {left} is left"
    )]
    TradeOverfill {
        client_id: u64,
        executed: Decimal,
        left: Decimal,
    },

    /// A live order's cancel was rejected past the retry budget.
    #[error("order {client_id} cancel rejected {retries} times, giving up")]
    CancelRetriesExhausted { client_id: u64, retries: u32 },

    /// A `user_data` snapshot arrived while we already hold a position.
    /// Snapshots are a startup-only mechanism; a second one means the
    /// session state is not what we think it is.
    #[error("position snapshot arrived while already holding {current}")]
    PositionSnapshotConflict { current: Decimal },
}
