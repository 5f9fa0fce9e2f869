//! Test doubles
//!
//! `RecordingVenue` implements [`VenueAdapter`] against in-memory vectors so
//! unit and integration tests can assert exactly which requests a
//! reconciliation pass produced, batch boundaries included.

use crate::venue::{PlaceOrder, VenueAdapter, VenueRequest};

/// In-memory venue adapter that records every request.
#[derive(Debug, Default)]
pub struct RecordingVenue {
    next_id: u64,
    /// Requests queued since the last flush.
    pub batch: Vec<VenueRequest>,
    /// Batches in dispatch order.
    pub flushed: Vec<Vec<VenueRequest>>,
}

impl RecordingVenue {
    pub fn new() -> Self {
        Self {
            next_id: 1000,
            batch: Vec::new(),
            flushed: Vec::new(),
        }
    }

    /// Every request issued so far, flushed or not, in issue order.
    pub fn requests(&self) -> impl Iterator<Item = &VenueRequest> {
        self.flushed.iter().flatten().chain(self.batch.iter())
    }

    /// All placements in issue order.
    pub fn placed(&self) -> Vec<PlaceOrder> {
        self.requests()
            .filter_map(|r| match r {
                VenueRequest::Place(order) => Some(order.clone()),
                VenueRequest::Cancel { .. } => None,
            })
            .collect()
    }

    /// All cancelled client ids in issue order.
    pub fn cancelled(&self) -> Vec<u64> {
        self.requests()
            .filter_map(|r| match r {
                VenueRequest::Cancel { client_order_id } => Some(*client_order_id),
                VenueRequest::Place(_) => None,
            })
            .collect()
    }

    /// Forget everything recorded so far (the id counter keeps running).
    pub fn clear(&mut self) {
        self.batch.clear();
        self.flushed.clear();
    }
}

impl VenueAdapter for RecordingVenue {
    fn next_client_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn place(&mut self, order: PlaceOrder) {
        self.batch.push(VenueRequest::Place(order));
    }

    fn cancel(&mut self, client_order_id: u64) {
        self.batch.push(VenueRequest::Cancel { client_order_id });
    }

    fn flush_batch(&mut self) {
        if !self.batch.is_empty() {
            self.flushed.push(std::mem::take(&mut self.batch));
        }
    }
}
