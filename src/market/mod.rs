//! Market data: quotes, pip arithmetic and the per-cycle snapshot cache.

pub mod quote;
pub mod snapshot;

pub use quote::{currencies, is_major, pip_factor, to_pips, Quote, QuoteRejection};
pub use snapshot::{MarketSnapshotCache, PriceHistory, PriceSample, RefreshReport};
