//! `$group` accumulators

use serde_json::Value;

use crate::document::{compare_values, Document};
use crate::query::{QueryError, QueryResult};

use super::expression::{Expr, Numeric};

/// Accumulator operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

impl AccumulatorOp {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "$sum" => Some(AccumulatorOp::Sum),
            "$avg" => Some(AccumulatorOp::Avg),
            "$min" => Some(AccumulatorOp::Min),
            "$max" => Some(AccumulatorOp::Max),
            "$first" => Some(AccumulatorOp::First),
            "$last" => Some(AccumulatorOp::Last),
            "$push" => Some(AccumulatorOp::Push),
            _ => None,
        }
    }
}

/// One output field of a `$group` stage: operator plus input expression
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub op: AccumulatorOp,
    pub input: Expr,
}

impl Accumulator {
    /// Parses `{"$sum": <expr>}`
    pub fn parse(field: &str, spec: &Value) -> QueryResult<Self> {
        let map = spec.as_object().filter(|m| m.len() == 1).ok_or_else(|| {
            QueryError::InvalidPipeline(format!(
                "$group field '{}' must be an object with one accumulator",
                field
            ))
        })?;

        let (name, operand) = map
            .iter()
            .next()
            .ok_or_else(|| QueryError::InvalidPipeline(format!("empty accumulator for '{}'", field)))?;
        let op = AccumulatorOp::from_name(name)
            .ok_or_else(|| QueryError::UnsupportedOperator(name.clone()))?;

        Ok(Self {
            op,
            input: Expr::parse(operand)?,
        })
    }

    /// Fresh running state
    pub fn start(&self) -> AccumulatorState {
        match self.op {
            AccumulatorOp::Sum => AccumulatorState::Sum(Numeric::Int(0)),
            AccumulatorOp::Avg => AccumulatorState::Avg { sum: 0.0, count: 0 },
            AccumulatorOp::Min => AccumulatorState::Min(None),
            AccumulatorOp::Max => AccumulatorState::Max(None),
            AccumulatorOp::First => AccumulatorState::First(None),
            AccumulatorOp::Last => AccumulatorState::Last(Value::Null),
            AccumulatorOp::Push => AccumulatorState::Push(Vec::new()),
        }
    }

    /// Feeds one document into the running state
    pub fn feed(&self, state: &mut AccumulatorState, doc: &Document) {
        state.update(self.input.eval(doc));
    }
}

/// Running state of one accumulator within one group
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorState {
    Sum(Numeric),
    Avg { sum: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
}

impl AccumulatorState {
    fn update(&mut self, value: Value) {
        match self {
            AccumulatorState::Sum(total) => {
                if let Some(n) = Numeric::of(&value) {
                    *total = total.add(n);
                }
            }
            AccumulatorState::Avg { sum, count } => {
                if let Some(n) = Numeric::of(&value) {
                    *sum += n.as_f64();
                    *count += 1;
                }
            }
            AccumulatorState::Min(best) => {
                if !value.is_null() && best.as_ref().map_or(true, |b| compare_values(Some(&value), Some(b)).is_lt()) {
                    *best = Some(value);
                }
            }
            AccumulatorState::Max(best) => {
                if !value.is_null() && best.as_ref().map_or(true, |b| compare_values(Some(&value), Some(b)).is_gt()) {
                    *best = Some(value);
                }
            }
            AccumulatorState::First(first) => {
                if first.is_none() {
                    *first = Some(value);
                }
            }
            AccumulatorState::Last(last) => *last = value,
            AccumulatorState::Push(items) => items.push(value),
        }
    }

    /// Final value; `$avg` over no numeric input is null
    pub fn finish(self) -> Value {
        match self {
            AccumulatorState::Sum(total) => total.into_value(),
            AccumulatorState::Avg { count: 0, .. } => Value::Null,
            AccumulatorState::Avg { sum, count } => Numeric::Float(sum / count as f64).into_value(),
            AccumulatorState::Min(v) | AccumulatorState::Max(v) | AccumulatorState::First(v) => {
                v.unwrap_or(Value::Null)
            }
            AccumulatorState::Last(v) => v,
            AccumulatorState::Push(items) => Value::Array(items),
        }
    }
}
