//! Query subsystem for litedoc
//!
//! # Flow
//!
//! 1. Caller supplies a `Filter`: structured criteria or a predicate closure
//! 2. Structured criteria are parsed into `Predicate`s (AND semantics)
//! 3. `QueryCompiler` picks a plan: SQL join over the index table, or a full
//!    scan when a predicate cannot be answered from index rows
//! 4. Full scans decode every record and run `PredicateMatcher`
//!
//! # Known constraints
//!
//! - Predicates on one list-of-scalars field are not correlated to the same
//!   element
//! - Fields holding lists of maps or lists are invisible to the indexed plan.
//!   Only conditions with null, map or list operands, `$exists` or `$regex`
//!   fall back to the scan; a scalar condition on a path inside such a list
//!   (`{"items.0.sku": "a"}`) compiles to the indexed plan and matches
//!   nothing
//! - A predicate closure passed to a mutating call runs while the
//!   connection is locked

mod compiler;
mod errors;
mod filter;
mod matcher;

pub use compiler::{
    index_table, quote_ident, CompiledQuery, QueryCompiler, QueryPlan, COMPARE_FUNCTION,
};
pub use errors::{QueryError, QueryResult};
pub use filter::{Criteria, Filter, FilterOp, Predicate, PredicateFn};
pub use matcher::PredicateMatcher;
