//! Quoter Core - Perpetual-Futures Market-Making Agent
//!
//! Maintains a symmetric two-sided quote ladder on one venue symbol,
//! anchored to an external reference price and skewed by inventory. The
//! hard part is not the quoting math but the bookkeeping around it: the
//! venue answers asynchronously, out of order, and sometimes not at all,
//! and the ladder has to converge anyway.
//!
//! ## Architecture
//!
//! ```text
//! reference feed ──▶ model ──▶ fair price, per-tick liquidity target
//!                                   │
//!                                   ▼
//!            engine ──▶ ladders (ring buffers) ──▶ place/cancel batch
//!               ▲                                        │
//!               │                                        ▼
//!          venue stream ◀───────────────────────── venue adapter
//! ```
//!
//! The engine is single-threaded: one tokio task drains one channel of
//! [`engine::EngineEvent`]s and mutates all core state serially. I/O lives
//! in separate tasks (stream readers, one request dispatcher) that talk to
//! the core only through channels.
//!
//! ## Core Modules
//! - `core`: side/grid/order primitives and the order lifecycle FSM
//! - `ladder`: per-side ring buffer and the reconciliation sweep
//! - `model`: inventory-skew fair price and liquidity curve
//! - `engine`: event demultiplexer, readiness gating, position tracking
//! - `venue`: adapter contract, wire-event parsing, REST/WS client
//! - `feed`: reference-price extraction and subscriber
//! - `config`: per-market parameters and validation
//! - `testing`: recording venue adapter for tests

pub mod config;
pub mod core;
pub mod engine;
pub mod feed;
pub mod ladder;
pub mod model;
pub mod testing;
pub mod venue;

// Re-export the types a consumer of the crate touches routinely.
pub use crate::core::{
    CancelState, ExecutionBand, FatalError, Order, OrderState, Side, TickGrid,
    TradeOutcome, MAX_CANCEL_RETRIES,
};
pub use config::MarketConfig;
pub use engine::{EngineEvent, MakerEngine};
pub use ladder::{ReconcileParams, SideLadder};
pub use model::{ModelParams, QuoteModel};
pub use venue::{PlaceOrder, VenueAdapter, VenueClient, VenueCredentials, VenueEndpoints, VenueRequest};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::MarketConfig;
    pub use crate::core::{ExecutionBand, FatalError, Side};
    pub use crate::engine::{EngineEvent, MakerEngine};
    pub use crate::venue::{VenueAdapter, VenueClient, VenueCredentials, VenueEndpoints};
}
