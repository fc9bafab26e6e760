//! Index Engine for litedoc
//!
//! Flattens a document into `(field path, encoded value, type tag)` rows that
//! the store persists in the collection's index table.
//!
//! # Invariants
//!
//! - Index rows are derived state: the stored document is the source of truth
//! - Rows for a record are deleted and rebuilt on every write of that record
//! - Only scalars are indexed; maps are recursed into, lists are expanded
//!   element-wise only when every element is a scalar
//! - The literal key `id` is never indexed, at any depth

mod flatten;

pub use flatten::{flatten, FlattenOutcome, IndexEntry, Node, TypeTag};
