//! Core domain types
//!
//! - `types`: order side and shared aliases
//! - `grid`: tick/lot quantization over exact decimals
//! - `order`: per-slot order record and its lifecycle state machine
//! - `errors`: fatal error taxonomy

pub mod errors;
pub mod grid;
pub mod order;
pub mod types;

pub use errors::FatalError;
pub use grid::TickGrid;
pub use order::{CancelState, Order, OrderState, TradeOutcome, MAX_CANCEL_RETRIES};
pub use types::{ExecutionBand, Side};
