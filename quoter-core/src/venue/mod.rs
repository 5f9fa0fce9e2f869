//! Venue adapter contract and outbound request types
//!
//! The core talks to the venue exclusively through [`VenueAdapter`]:
//! allocate a client id, queue a placement or a cancel, and flush the queue
//! as one batch at the end of a reconciliation pass. The adapter is free to
//! dispatch asynchronously; confirmations come back as ordinary venue
//! events, never as return values.

pub mod client;
pub mod events;

pub use client::{VenueClient, VenueCredentials, VenueEndpoints};
pub use events::{
    parse_venue_message, BalanceEntry, ExecutionKind, OpenOrder, OrderEventKind,
    PositionEntry, ProtocolError, UserDataPartial, VenueEvent,
};

use crate::core::Side;
use rust_decimal::Decimal;

/// A new-order request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub client_order_id: u64,
    pub side: Side,
    pub amount: Decimal,
    pub price: Decimal,
    pub leverage: u32,
}

/// One outbound request, as queued into a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueRequest {
    Place(PlaceOrder),
    Cancel { client_order_id: u64 },
}

/// The venue surface the core consumes.
///
/// Implementations: [`client::VenueClient`] for the real venue,
/// `testing::RecordingVenue` for tests.
pub trait VenueAdapter {
    /// Allocate the next client order id. Ids are process-wide, serial,
    /// and strictly increasing.
    fn next_client_id(&mut self) -> u64;

    /// Queue a new-order request into the current batch.
    fn place(&mut self, order: PlaceOrder);

    /// Queue a cancel request into the current batch.
    fn cancel(&mut self, client_order_id: u64);

    /// Dispatch everything queued since the last flush.
    fn flush_batch(&mut self);
}
