//! Expression evaluator
//!
//! Resolves literals, `"$path"` references and arithmetic operator objects
//! against one document. Missing references evaluate to null.

use serde_json::{Map, Number, Value};

use crate::document::{get_path, numeric_value, Document};
use crate::query::{QueryError, QueryResult};

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value
    Literal(Value),
    /// `"$a.b"` reference, stored without the leading `$`
    Field(String),
    /// Object of named sub-expressions, e.g. a composite group key
    Object(Vec<(String, Expr)>),
    /// `{"$multiply": [..]}`
    Multiply(Vec<Expr>),
    /// `{"$sum": [..]}` or `{"$sum": "$list"}`
    Sum(Vec<Expr>),
    /// `{"$add": [..]}`
    Add(Vec<Expr>),
    /// `{"$subtract": [a, b]}`
    Subtract(Box<Expr>, Box<Expr>),
    /// `{"$divide": [a, b]}`
    Divide(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses an expression
    pub fn parse(value: &Value) -> QueryResult<Self> {
        match value {
            Value::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                if path.is_empty() {
                    return Err(QueryError::InvalidPipeline("empty field reference '$'".into()));
                }
                Ok(Expr::Field(path.to_string()))
            }
            Value::Object(map) => Self::parse_object(map),
            other => Ok(Expr::Literal(other.clone())),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> QueryResult<Self> {
        let operator = match map.iter().next() {
            Some((key, operand)) if key.starts_with('$') => {
                if map.len() != 1 {
                    return Err(QueryError::InvalidPipeline(format!(
                        "expression '{}' must be the only key of its object",
                        key
                    )));
                }
                (key.as_str(), operand)
            }
            _ => {
                let mut fields = Vec::with_capacity(map.len());
                for (key, sub) in map {
                    if key.starts_with('$') {
                        return Err(QueryError::InvalidPipeline(format!(
                            "operator '{}' mixed with plain keys",
                            key
                        )));
                    }
                    fields.push((key.clone(), Expr::parse(sub)?));
                }
                return Ok(Expr::Object(fields));
            }
        };

        let (name, operand) = operator;
        match name {
            "$multiply" => Ok(Expr::Multiply(parse_args(operand)?)),
            "$sum" => Ok(Expr::Sum(parse_args(operand)?)),
            "$add" => Ok(Expr::Add(parse_args(operand)?)),
            "$subtract" => {
                let (a, b) = parse_pair(name, operand)?;
                Ok(Expr::Subtract(a, b))
            }
            "$divide" => {
                let (a, b) = parse_pair(name, operand)?;
                Ok(Expr::Divide(a, b))
            }
            "$literal" => Ok(Expr::Literal(operand.clone())),
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }

    /// Evaluates against a document
    pub fn eval(&self, doc: &Document) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Field(path) => get_path(doc, path).cloned().unwrap_or(Value::Null),
            Expr::Object(fields) => {
                let mut out = Map::new();
                for (key, sub) in fields {
                    out.insert(key.clone(), sub.eval(doc));
                }
                Value::Object(out)
            }
            Expr::Multiply(args) => fold_strict(args, doc, Numeric::Int(1), Numeric::mul),
            Expr::Add(args) => fold_strict(args, doc, Numeric::Int(0), Numeric::add),
            Expr::Sum(args) => {
                let mut total = Numeric::Int(0);
                for value in spread(args, doc) {
                    if let Some(n) = Numeric::of(&value) {
                        total = total.add(n);
                    }
                }
                total.into_value()
            }
            Expr::Subtract(a, b) => match (Numeric::of(&a.eval(doc)), Numeric::of(&b.eval(doc))) {
                (Some(x), Some(y)) => x.sub(y).into_value(),
                _ => Value::Null,
            },
            Expr::Divide(a, b) => match (Numeric::of(&a.eval(doc)), Numeric::of(&b.eval(doc))) {
                (Some(x), Some(y)) if y.as_f64() != 0.0 => {
                    Numeric::Float(x.as_f64() / y.as_f64()).into_value()
                }
                _ => Value::Null,
            },
        }
    }
}

fn parse_args(operand: &Value) -> QueryResult<Vec<Expr>> {
    match operand {
        Value::Array(items) => items.iter().map(Expr::parse).collect(),
        single => Ok(vec![Expr::parse(single)?]),
    }
}

fn parse_pair(name: &str, operand: &Value) -> QueryResult<(Box<Expr>, Box<Expr>)> {
    match operand {
        Value::Array(items) if items.len() == 2 => Ok((
            Box::new(Expr::parse(&items[0])?),
            Box::new(Expr::parse(&items[1])?),
        )),
        _ => Err(QueryError::InvalidPipeline(format!(
            "{} expects an array of two expressions",
            name
        ))),
    }
}

/// Evaluates arguments; a single argument resolving to a list contributes its elements
fn spread(args: &[Expr], doc: &Document) -> Vec<Value> {
    if let [only] = args {
        if let Value::Array(items) = only.eval(doc) {
            return items;
        }
    }
    args.iter().map(|a| a.eval(doc)).collect()
}

/// Folds every operand; any non-numeric operand yields null
fn fold_strict(
    args: &[Expr],
    doc: &Document,
    init: Numeric,
    op: fn(Numeric, Numeric) -> Numeric,
) -> Value {
    let mut acc = init;
    for arg in args {
        match Numeric::of(&arg.eval(doc)) {
            Some(n) => acc = op(acc, n),
            None => return Value::Null,
        }
    }
    acc.into_value()
}

/// Number that stays integral while every operand is integral
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    /// Numbers and numeric-looking strings (`"5"`, `" 2.5 "`)
    pub(crate) fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Numeric::Int(i)),
                None => n.as_f64().map(Numeric::Float),
            },
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Some(Numeric::Int(i)),
                Err(_) => numeric_value(value).map(Numeric::Float),
            },
            _ => None,
        }
    }

    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    pub(crate) fn add(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a
                .checked_add(b)
                .map(Numeric::Int)
                .unwrap_or(Numeric::Float(a as f64 + b as f64)),
            (a, b) => Numeric::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn sub(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a
                .checked_sub(b)
                .map(Numeric::Int)
                .unwrap_or(Numeric::Float(a as f64 - b as f64)),
            (a, b) => Numeric::Float(a.as_f64() - b.as_f64()),
        }
    }

    fn mul(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a
                .checked_mul(b)
                .map(Numeric::Int)
                .unwrap_or(Numeric::Float(a as f64 * b as f64)),
            (a, b) => Numeric::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// Non-finite floats become null
    pub(crate) fn into_value(self) -> Value {
        match self {
            Numeric::Int(i) => Value::from(i),
            Numeric::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}
