//! Query compiler
//!
//! Turns parsed criteria into either a SQL statement joining the collection's
//! index table once per predicate, or a full-scan plan evaluated in memory.
//!
//! # Compiled shape
//!
//! ```text
//! SELECT p.id, p.doc FROM "users" p
//!   JOIN "users_index" c0 ON p.id = c0.parent_id AND c0.field = ?1
//!   JOIN "users_index" c1 ON p.id = c1.parent_id AND c1.field = ?3
//! WHERE c0.value = ?2 AND doc_cmp(c1.value, ?4) > 0
//! GROUP BY p.id ORDER BY p.id
//! ```
//!
//! Equality and membership compare canonical strings so SQLite can use the
//! `(field, value)` index. Range operators go through `doc_cmp`, which orders
//! numeric-looking text numerically.
//!
//! Predicates on the same list field each join their own alias, so they are
//! not correlated to the same list element.

use serde_json::Value;

use crate::document::encode_scalar;

use super::filter::{Criteria, FilterOp, Predicate};

/// SQL function registered on every connection by the store
pub const COMPARE_FUNCTION: &str = "doc_cmp";

/// Execution plan chosen for a criteria
#[derive(Debug, Clone)]
pub enum QueryPlan {
    /// Answerable from the index table
    Indexed(CompiledQuery),
    /// Decode every record and evaluate in memory
    FullScan(Criteria),
}

impl QueryPlan {
    /// Plan name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            QueryPlan::Indexed(_) => "indexed",
            QueryPlan::FullScan(_) => "full_scan",
        }
    }
}

/// SQL text plus positional text bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<String>,
}

/// Quotes an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Name of the index table backing a collection
pub fn index_table(collection: &str) -> String {
    format!("{}_index", collection)
}

/// Compiles criteria for a collection
pub struct QueryCompiler;

impl QueryCompiler {
    /// Chooses a plan and, for indexed plans, renders the SQL
    pub fn compile(collection: &str, criteria: Criteria) -> QueryPlan {
        if criteria.requires_full_scan() {
            return QueryPlan::FullScan(criteria);
        }
        QueryPlan::Indexed(Self::render(collection, &criteria))
    }

    /// Statement that loads every record in insertion order
    pub fn scan_all(collection: &str) -> CompiledQuery {
        CompiledQuery {
            sql: format!(
                "SELECT p.id, p.doc FROM {} p ORDER BY p.id",
                quote_ident(collection)
            ),
            bindings: Vec::new(),
        }
    }

    fn render(collection: &str, criteria: &Criteria) -> CompiledQuery {
        if criteria.is_empty() {
            return Self::scan_all(collection);
        }

        let table = quote_ident(collection);
        let index = quote_ident(&index_table(collection));
        let mut builder = SqlBuilder::default();
        let mut joins = Vec::with_capacity(criteria.predicates.len());
        let mut conditions = Vec::with_capacity(criteria.predicates.len());

        for (i, predicate) in criteria.predicates.iter().enumerate() {
            let alias = format!("c{}", i);
            let field = builder.bind(predicate.field.clone());
            joins.push(format!(
                "JOIN {index} {alias} ON p.id = {alias}.parent_id AND {alias}.field = {field}"
            ));
            conditions.push(Self::condition(&alias, predicate, &mut builder));
        }

        CompiledQuery {
            sql: format!(
                "SELECT p.id, p.doc FROM {table} p {} WHERE {} GROUP BY p.id ORDER BY p.id",
                joins.join(" "),
                conditions.join(" AND ")
            ),
            bindings: builder.bindings,
        }
    }

    fn condition(alias: &str, predicate: &Predicate, builder: &mut SqlBuilder) -> String {
        let column = format!("{}.value", alias);
        match &predicate.op {
            FilterOp::Eq(v) => format!("{column} = {}", builder.bind_value(v)),
            FilterOp::Ne(v) => format!("{column} != {}", builder.bind_value(v)),
            FilterOp::Gt(v) => Self::range(&column, ">", v, builder),
            FilterOp::Gte(v) => Self::range(&column, ">=", v, builder),
            FilterOp::Lt(v) => Self::range(&column, "<", v, builder),
            FilterOp::Lte(v) => Self::range(&column, "<=", v, builder),
            FilterOp::In(values) if values.is_empty() => "0".to_string(),
            FilterOp::Nin(values) if values.is_empty() => "1".to_string(),
            FilterOp::In(values) => format!("{column} IN ({})", builder.bind_list(values)),
            FilterOp::Nin(values) => format!("{column} NOT IN ({})", builder.bind_list(values)),
            // Never indexable; guarded by requires_full_scan
            FilterOp::Exists(_) | FilterOp::Regex(_) => "0".to_string(),
        }
    }

    fn range(column: &str, op: &str, bound: &Value, builder: &mut SqlBuilder) -> String {
        format!(
            "{COMPARE_FUNCTION}({column}, {}) {op} 0",
            builder.bind_value(bound)
        )
    }
}

#[derive(Default)]
struct SqlBuilder {
    bindings: Vec<String>,
}

impl SqlBuilder {
    fn bind(&mut self, text: String) -> String {
        self.bindings.push(text);
        format!("?{}", self.bindings.len())
    }

    fn bind_value(&mut self, value: &Value) -> String {
        self.bind(encode_scalar(value).unwrap_or_default())
    }

    fn bind_list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.bind_value(v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
