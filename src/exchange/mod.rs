//! Storage exchange accounting
//!
//! Keeps what we store for each peer and what each peer stores for us
//! within a bounded imbalance, so nobody can free-ride.

mod book;
mod contract;

pub use book::ExchangeBook;
pub use contract::{ExchangeContract, ExchangeError, Side};
