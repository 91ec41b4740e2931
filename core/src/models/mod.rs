use serde::{Deserialize, Serialize};

pub mod snapshot;

pub use snapshot::{DerivedPrices, OrderSnapshot, PriceLevel};

/// Number of levels per side kept in a published snapshot.
pub const TOP_LEVELS: usize = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Ask,

    #[default]
    Bid,
}
