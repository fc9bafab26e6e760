//! Aggregation Engine for litedoc
//!
//! Runs a pipeline over a collection materialized in memory. There is no
//! index pushdown and no stage reordering: put `$match` first to narrow early.
//!
//! Supported stages: `$match`, `$unwind`, `$group`, `$sort`, `$skip`,
//! `$limit`, `$project`.

mod accumulator;
mod expression;
mod pipeline;

pub use accumulator::{Accumulator, AccumulatorOp, AccumulatorState};
pub use expression::{Expr, Numeric};
pub use pipeline::{Pipeline, Projection, Stage};
