//! Market data model shared by the publisher core and its drivers.

pub mod binance;
pub mod error;
pub mod models;

pub use error::SnapshotError;
pub use models::{BookSide, DerivedPrices, OrderSnapshot, PriceLevel, TOP_LEVELS};
