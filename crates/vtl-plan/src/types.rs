//! Type system for plan fields

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    // Primitives
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },

    // Text
    String,
    Varchar(u32),
    Char(u32),

    // Binary
    Binary,

    // Temporal
    Date,
    Timestamp,

    // Complex
    Array(Box<DataType>),
    Map { key: Box<DataType>, value: Box<DataType> },
    Struct(Vec<Field>),

    // Special
    Null,
}

/// Coarse grouping of types, used by operand type rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Any,
    Boolean,
    Integer,
    Numeric,
    Character,
    Binary,
    Datetime,
    Array,
    Map,
    Struct,
}

impl DataType {
    pub fn family(&self) -> TypeFamily {
        match self {
            DataType::Boolean => TypeFamily::Boolean,
            DataType::TinyInt | DataType::SmallInt | DataType::Int | DataType::BigInt => {
                TypeFamily::Integer
            }
            DataType::Float | DataType::Double | DataType::Decimal { .. } => TypeFamily::Numeric,
            DataType::String | DataType::Varchar(_) | DataType::Char(_) => TypeFamily::Character,
            DataType::Binary => TypeFamily::Binary,
            DataType::Date | DataType::Timestamp => TypeFamily::Datetime,
            DataType::Array(_) => TypeFamily::Array,
            DataType::Map { .. } => TypeFamily::Map,
            DataType::Struct(_) => TypeFamily::Struct,
            DataType::Null => TypeFamily::Any,
        }
    }

    /// Whether a value of this type belongs to `family`.
    ///
    /// Integers are numeric, and NULL fits every family.
    pub fn is_in(&self, family: TypeFamily) -> bool {
        let own = self.family();
        own == family
            || family == TypeFamily::Any
            || own == TypeFamily::Any
            || (family == TypeFamily::Numeric && own == TypeFamily::Integer)
    }

    /// Element type of an array, or `(key, value)` of a map.
    pub fn exploded_types(&self) -> Option<Vec<&DataType>> {
        match self {
            DataType::Array(element) => Some(vec![element.as_ref()]),
            DataType::Map { key, value } => Some(vec![key.as_ref(), value.as_ref()]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// Names invented by the upstream planner (`EXPR$0`, `_c1`) rather than
    /// written by the view author.
    pub fn has_generated_name(&self) -> bool {
        is_generated_name(&self.name)
    }
}

pub fn is_generated_name(name: &str) -> bool {
    let digits = name
        .strip_prefix("EXPR$")
        .or_else(|| name.strip_prefix("_c"));
    matches!(digits, Some(d) if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
}
