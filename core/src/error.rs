use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::BookSide;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("sequence id must be positive")]
    NonPositiveSequence,

    #[error("{0:?} side is empty")]
    EmptySide(BookSide),

    #[error("{side:?} levels not strictly ordered at index {index}")]
    NotStrictlyOrdered { side: BookSide, index: usize },

    #[error("crossed or locked book: best bid {best_bid} >= best ask {best_ask}")]
    CrossedBook { best_bid: Decimal, best_ask: Decimal },

    #[error("derived prices overflow: best bid {best_bid}, best ask {best_ask}")]
    PriceOverflow { best_bid: Decimal, best_ask: Decimal },

    #[error("malformed depth payload: {0}")]
    Malformed(String),
}
