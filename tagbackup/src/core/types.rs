//! Value model shared by the codec, the array transcoder and the orchestrators.
//!
//! These types carry no I/O and are rebuilt per backup or restore run.

use chrono::{DateTime, Utc};

use crate::core::array::TagArray;

/// Closed set of scalar kinds a tag value may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    Float32,
    Float64,
    String,
    Timestamp,
}

impl ValueType {
    /// Every value type, in declaration order.
    pub const ALL: [ValueType; 13] = [
        ValueType::Int8,
        ValueType::Int16,
        ValueType::Int32,
        ValueType::Int64,
        ValueType::UInt8,
        ValueType::UInt16,
        ValueType::UInt32,
        ValueType::UInt64,
        ValueType::Bool,
        ValueType::Float32,
        ValueType::Float64,
        ValueType::String,
        ValueType::Timestamp,
    ];

    /// Canonical type name written to the `DataType` column.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Int8 => "Int8",
            ValueType::Int16 => "Int16",
            ValueType::Int32 => "Int32",
            ValueType::Int64 => "Int64",
            ValueType::UInt8 => "UInt8",
            ValueType::UInt16 => "UInt16",
            ValueType::UInt32 => "UInt32",
            ValueType::UInt64 => "UInt64",
            ValueType::Bool => "Bool",
            ValueType::Float32 => "Float32",
            ValueType::Float64 => "Float64",
            ValueType::String => "String",
            ValueType::Timestamp => "Timestamp",
        }
    }

    /// Look up a type by canonical name.
    ///
    /// The OPC UA built-in names (`SByte`, `Byte`, `Boolean`, `Float`,
    /// `Double`, `DateTime`) are accepted as aliases. Matching is exact
    /// (case-sensitive).
    pub fn from_name(name: &str) -> Option<ValueType> {
        if let Some(found) = ValueType::ALL.into_iter().find(|ty| ty.name() == name) {
            return Some(found);
        }
        match name {
            "SByte" => Some(ValueType::Int8),
            "Byte" => Some(ValueType::UInt8),
            "Boolean" => Some(ValueType::Bool),
            "Float" => Some(ValueType::Float32),
            "Double" => Some(ValueType::Float64),
            "DateTime" => Some(ValueType::Timestamp),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single native value. The variant is the type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Bool(bool),
    Float32(f32),
    Float64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl ScalarValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ScalarValue::Int8(_) => ValueType::Int8,
            ScalarValue::Int16(_) => ValueType::Int16,
            ScalarValue::Int32(_) => ValueType::Int32,
            ScalarValue::Int64(_) => ValueType::Int64,
            ScalarValue::UInt8(_) => ValueType::UInt8,
            ScalarValue::UInt16(_) => ValueType::UInt16,
            ScalarValue::UInt32(_) => ValueType::UInt32,
            ScalarValue::UInt64(_) => ValueType::UInt64,
            ScalarValue::Bool(_) => ValueType::Bool,
            ScalarValue::Float32(_) => ValueType::Float32,
            ScalarValue::Float64(_) => ValueType::Float64,
            ScalarValue::String(_) => ValueType::String,
            ScalarValue::Timestamp(_) => ValueType::Timestamp,
        }
    }

    /// Bit-exact equality: floats compare by bit pattern so `NaN == NaN`
    /// and `0.0 != -0.0`.
    pub fn same_as(&self, other: &ScalarValue) -> bool {
        match (self, other) {
            (ScalarValue::Float32(a), ScalarValue::Float32(b)) => a.to_bits() == b.to_bits(),
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// Value of one tag: a scalar or a rank-1/rank-2 array.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Scalar(ScalarValue),
    Array(TagArray),
}

/// A tag addressed by its path relative to the backup root.
///
/// The path is an opaque join key between backup and restore.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    pub relative_path: String,
    pub value: TagValue,
}

impl TagEntry {
    pub fn new(relative_path: impl Into<String>, value: TagValue) -> Self {
        Self {
            relative_path: relative_path.into(),
            value,
        }
    }
}
