//! JSON wire form of tags, shared by the tag store file and the bridge command.
//!
//! ```json
//! {"path": "Tank.Level", "type": "Float64", "value": 3.5}
//! {"path": "Line.Setpoints", "type": "Int32", "value": [1, 2, 3]}
//! {"path": "Grid", "type": "UInt8", "value": [[1, 2], [3, 4]]}
//! ```
//!
//! Array rank is the nesting depth. Timestamps and non-finite floats travel
//! as strings in their codec form.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::core::array::{Shape, TagArray};
use crate::core::types::{ScalarValue, TagEntry, TagValue, ValueType};
use crate::core::value_codec;
use crate::io::remote::{RemoteTag, RemoteValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTag {
    pub path: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tag {path}: {reason}")]
pub struct TagDocError {
    pub path: String,
    pub reason: String,
}

impl JsonTag {
    pub fn to_remote(&self) -> Result<RemoteTag, TagDocError> {
        let fail = |reason: String| TagDocError {
            path: self.path.clone(),
            reason,
        };

        let value = if self.value.is_null() {
            RemoteValue::Null
        } else if let Some(element_type) = ValueType::from_name(&self.data_type) {
            if self.value.is_array() {
                let dimensions = json_dimensions(&self.value);
                let mut elements = Vec::new();
                collect_elements(&self.value, element_type, &dimensions, 0, &mut elements)
                    .map_err(fail)?;
                RemoteValue::Array {
                    element_type,
                    dimensions,
                    elements,
                }
            } else {
                RemoteValue::Scalar(scalar_from_json(&self.value, element_type).map_err(fail)?)
            }
        } else {
            RemoteValue::Unmapped {
                type_name: self.data_type.clone(),
            }
        };
        Ok(RemoteTag::new(self.path.clone(), value))
    }

    pub fn from_entry(entry: &TagEntry) -> Self {
        let (data_type, value) = match &entry.value {
            TagValue::Scalar(scalar) => (scalar.value_type(), scalar_to_json(scalar)),
            TagValue::Array(array) => (array.element_type(), array_to_json(array)),
        };
        Self {
            path: entry.relative_path.clone(),
            data_type: data_type.name().to_string(),
            value,
        }
    }
}

/// Lengths along the first-element chain of nested arrays.
fn json_dimensions(value: &Value) -> Vec<usize> {
    let mut dimensions = Vec::new();
    let mut current = value;
    while let Value::Array(items) = current {
        dimensions.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    dimensions
}

fn collect_elements(
    value: &Value,
    element_type: ValueType,
    dimensions: &[usize],
    depth: usize,
    out: &mut Vec<ScalarValue>,
) -> Result<(), String> {
    if depth == dimensions.len() {
        if value.is_array() {
            return Err("ragged array nesting".to_string());
        }
        out.push(scalar_from_json(value, element_type)?);
        return Ok(());
    }
    let Value::Array(items) = value else {
        return Err("ragged array nesting".to_string());
    };
    if items.len() != dimensions[depth] {
        return Err(format!(
            "ragged array: expected {} items at depth {}, found {}",
            dimensions[depth],
            depth,
            items.len()
        ));
    }
    for item in items {
        collect_elements(item, element_type, dimensions, depth + 1, out)?;
    }
    Ok(())
}

fn scalar_from_json(value: &Value, value_type: ValueType) -> Result<ScalarValue, String> {
    let mismatch = || format!("expected {value_type} value, found {value}");
    match (value_type, value) {
        (ValueType::String, Value::String(text)) => Ok(ScalarValue::String(text.clone())),
        (_, Value::String(text)) => {
            value_codec::decode(text, value_type).map_err(|err| err.to_string())
        }
        (ValueType::Bool, Value::Bool(flag)) => Ok(ScalarValue::Bool(*flag)),
        (_, Value::Number(n)) => number_to_scalar(n, value_type).ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

fn number_to_scalar(n: &Number, value_type: ValueType) -> Option<ScalarValue> {
    match value_type {
        ValueType::Int8 => integer(n).map(ScalarValue::Int8),
        ValueType::Int16 => integer(n).map(ScalarValue::Int16),
        ValueType::Int32 => integer(n).map(ScalarValue::Int32),
        ValueType::Int64 => integer(n).map(ScalarValue::Int64),
        ValueType::UInt8 => integer(n).map(ScalarValue::UInt8),
        ValueType::UInt16 => integer(n).map(ScalarValue::UInt16),
        ValueType::UInt32 => integer(n).map(ScalarValue::UInt32),
        ValueType::UInt64 => integer(n).map(ScalarValue::UInt64),
        ValueType::Float32 => n.as_f64().map(|v| ScalarValue::Float32(v as f32)),
        ValueType::Float64 => n.as_f64().map(ScalarValue::Float64),
        ValueType::Bool | ValueType::String | ValueType::Timestamp => None,
    }
}

fn integer<T>(n: &Number) -> Option<T>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    n.as_i64()
        .and_then(|v| <T as TryFrom<i64>>::try_from(v).ok())
        .or_else(|| n.as_u64().and_then(|v| <T as TryFrom<u64>>::try_from(v).ok()))
}

fn scalar_to_json(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Int8(v) => Value::from(*v),
        ScalarValue::Int16(v) => Value::from(*v),
        ScalarValue::Int32(v) => Value::from(*v),
        ScalarValue::Int64(v) => Value::from(*v),
        ScalarValue::UInt8(v) => Value::from(*v),
        ScalarValue::UInt16(v) => Value::from(*v),
        ScalarValue::UInt32(v) => Value::from(*v),
        ScalarValue::UInt64(v) => Value::from(*v),
        ScalarValue::Bool(v) => Value::Bool(*v),
        ScalarValue::Float32(v) => float_to_json(f64::from(*v), value),
        ScalarValue::Float64(v) => float_to_json(*v, value),
        ScalarValue::String(v) => Value::String(v.clone()),
        ScalarValue::Timestamp(_) => Value::String(value_codec::encode(value)),
    }
}

fn float_to_json(number: f64, original: &ScalarValue) -> Value {
    match Number::from_f64(number) {
        Some(n) if number != 0.0 || number.is_sign_positive() => Value::Number(n),
        _ => Value::String(value_codec::encode(original)),
    }
}

fn array_to_json(array: &TagArray) -> Value {
    let elements = array.elements();
    match array.shape() {
        Shape::Vector { .. } => Value::Array(elements.iter().map(scalar_to_json).collect()),
        Shape::Matrix { rows, columns } => Value::Array(
            (0..rows)
                .map(|row| {
                    Value::Array(
                        elements[row * columns..(row + 1) * columns]
                            .iter()
                            .map(scalar_to_json)
                            .collect(),
                    )
                })
                .collect(),
        ),
    }
}
