//! Document flattening
//!
//! Walks the document depth-first over a closed `Node` view of each value.

use serde_json::{Map, Value};

use crate::document::encode_scalar;

/// Key skipped at every depth
const SKIPPED_KEY: &str = "id";

/// Type tag persisted next to each encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    String = 0,
    Int = 1,
    Float = 2,
    Bool = 3,
}

impl TypeTag {
    /// Tag for a scalar value; None for null and containers
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(TypeTag::String),
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(TypeTag::Int),
            Value::Number(_) => Some(TypeTag::Float),
            _ => None,
        }
    }

    /// Integer persisted in the `type` column
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    /// Parses the persisted column back; unknown codes read as strings
    pub fn from_i64(code: i64) -> Self {
        match code {
            1 => TypeTag::Int,
            2 => TypeTag::Float,
            3 => TypeTag::Bool,
            _ => TypeTag::String,
        }
    }
}

/// One index row, minus the parent record id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Dot-joined field path
    pub field: String,
    /// Canonical string encoding of the value
    pub value: String,
    /// Scalar type of the original value
    pub type_tag: TypeTag,
}

impl IndexEntry {
    fn scalar(field: String, value: &Value) -> Option<Self> {
        Some(Self {
            value: encode_scalar(value)?,
            type_tag: TypeTag::of(value)?,
            field,
        })
    }
}

/// Closed view over a JSON value used by the flattening visitor
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    /// String, number or boolean
    Scalar(&'a Value),
    /// Null carries nothing to index
    Null,
    /// Ordered list of values
    List(&'a [Value]),
    /// Nested map
    Map(&'a Map<String, Value>),
}

impl<'a> Node<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Array(items) => Node::List(items),
            Value::Object(map) => Node::Map(map),
            scalar => Node::Scalar(scalar),
        }
    }

    fn is_container(&self) -> bool {
        matches!(self, Node::List(_) | Node::Map(_))
    }
}

/// Result of flattening one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenOutcome {
    /// Rows to persist
    pub entries: Vec<IndexEntry>,
    /// Paths of lists skipped because they hold a map or a list
    pub unindexed: Vec<String>,
}

/// Flattens a document into index entries
pub fn flatten(doc: &Map<String, Value>) -> FlattenOutcome {
    let mut outcome = FlattenOutcome::default();
    visit_map(doc, "", &mut outcome);
    outcome
}

fn visit_map(map: &Map<String, Value>, prefix: &str, out: &mut FlattenOutcome) {
    for (key, value) in map {
        if key == SKIPPED_KEY {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        visit(Node::of(value), path, out);
    }
}

fn visit(node: Node<'_>, path: String, out: &mut FlattenOutcome) {
    match node {
        Node::Scalar(value) => out.entries.extend(IndexEntry::scalar(path, value)),
        Node::Null => {}
        Node::Map(map) => visit_map(map, &path, out),
        Node::List(items) => {
            if items.iter().any(|item| Node::of(item).is_container()) {
                out.unindexed.push(path);
                return;
            }
            for (i, item) in items.iter().enumerate() {
                if let Node::Scalar(value) = Node::of(item) {
                    out.entries
                        .extend(IndexEntry::scalar(format!("{}.{}", path, i), value));
                }
            }
        }
    }
}
