//! Array flattening into marker + element records, and the reverse.
//!
//! A rank-1 array of `rows` elements is written as `ARRAY:<rows>` followed by
//! rows indexed `0..rows`. A rank-2 array is written as
//! `ARRAY:<rows>x<columns>` followed by rows indexed `i.j` in row-major order.

use thiserror::Error;

use crate::core::record::{Record, RecordKind};
use crate::core::types::{ScalarValue, ValueType};
use crate::core::value_codec::{self, ValueError};

pub const ARRAY_MARKER_PREFIX: &str = "ARRAY:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    #[error("only one- and two-dimensional arrays are supported, found rank {rank}")]
    UnsupportedRank { rank: usize },
    #[error("malformed array marker {marker:?}")]
    BadMarker { marker: String },
    #[error("array block must start with a marker record")]
    MissingMarker,
    #[error("array of {expected} elements has {found}")]
    ElementCount { expected: usize, found: usize },
    #[error("array has no elements, element type is unknown")]
    Empty,
    #[error("element {index} has type {found}, expected {expected}")]
    MixedTypes {
        index: usize,
        expected: ValueType,
        found: ValueType,
    },
    #[error("expected element index {expected:?}, found {found:?}")]
    UnexpectedIndex { expected: String, found: String },
    #[error("element {index:?} belongs to {found:?}, expected {expected:?}")]
    PathMismatch {
        index: String,
        expected: String,
        found: String,
    },
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Dimensions of a supported array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Vector { rows: usize },
    Matrix { rows: usize, columns: usize },
}

impl Shape {
    pub fn from_dimensions(dimensions: &[usize]) -> Result<Self, ArrayError> {
        match *dimensions {
            [rows] => Ok(Shape::Vector { rows }),
            [rows, columns] => Ok(Shape::Matrix { rows, columns }),
            _ => Err(ArrayError::UnsupportedRank {
                rank: dimensions.len(),
            }),
        }
    }

    pub fn dimensions(&self) -> Vec<usize> {
        match *self {
            Shape::Vector { rows } => vec![rows],
            Shape::Matrix { rows, columns } => vec![rows, columns],
        }
    }

    pub fn element_count(&self) -> usize {
        match *self {
            Shape::Vector { rows } => rows,
            Shape::Matrix { rows, columns } => rows * columns,
        }
    }

    /// `Index` column of the marker record.
    pub fn marker(&self) -> String {
        match *self {
            Shape::Vector { rows } => format!("{ARRAY_MARKER_PREFIX}{rows}"),
            Shape::Matrix { rows, columns } => format!("{ARRAY_MARKER_PREFIX}{rows}x{columns}"),
        }
    }

    /// Parse a marker `Index` such as `ARRAY:3` or `ARRAY:2x4`.
    pub fn parse_marker(index: &str) -> Result<Self, ArrayError> {
        let bad = || ArrayError::BadMarker {
            marker: index.to_string(),
        };
        let dims = index.strip_prefix(ARRAY_MARKER_PREFIX).ok_or_else(bad)?;
        let parsed = dims
            .split('x')
            .map(parse_dimension)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(bad)?;
        let shape = match *parsed.as_slice() {
            [rows] => Shape::Vector { rows },
            [rows, columns] => {
                rows.checked_mul(columns).ok_or_else(bad)?;
                Shape::Matrix { rows, columns }
            }
            _ => return Err(bad()),
        };
        Ok(shape)
    }

    /// `Index` column of the element at row-major position `flat`.
    pub fn element_index(&self, flat: usize) -> String {
        match *self {
            Shape::Vector { .. } => flat.to_string(),
            Shape::Matrix { columns, .. } => {
                let columns = columns.max(1);
                format!("{}.{}", flat / columns, flat % columns)
            }
        }
    }
}

fn parse_dimension(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Homogeneous rank-1 or rank-2 array stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct TagArray {
    shape: Shape,
    element_type: ValueType,
    elements: Vec<ScalarValue>,
}

impl TagArray {
    pub fn new(
        shape: Shape,
        element_type: ValueType,
        elements: Vec<ScalarValue>,
    ) -> Result<Self, ArrayError> {
        let expected = shape.element_count();
        if elements.len() != expected {
            return Err(ArrayError::ElementCount {
                expected,
                found: elements.len(),
            });
        }
        if let Some((index, element)) = elements
            .iter()
            .enumerate()
            .find(|(_, element)| element.value_type() != element_type)
        {
            return Err(ArrayError::MixedTypes {
                index,
                expected: element_type,
                found: element.value_type(),
            });
        }
        Ok(Self {
            shape,
            element_type,
            elements,
        })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn element_type(&self) -> ValueType {
        self.element_type
    }

    pub fn elements(&self) -> &[ScalarValue] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Bit-exact comparison, see [`ScalarValue::same_as`].
    pub fn same_as(&self, other: &TagArray) -> bool {
        self.shape == other.shape
            && self.element_type == other.element_type
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.same_as(b))
    }
}

/// Marker record followed by one record per element, row-major.
pub fn flatten(relative_path: &str, array: &TagArray) -> Vec<Record> {
    let type_name = array.element_type.name();
    let mut records = Vec::with_capacity(array.elements.len() + 1);
    records.push(Record::new(array.shape.marker(), "", "", ""));
    for (flat, element) in array.elements.iter().enumerate() {
        records.push(Record::new(
            array.shape.element_index(flat),
            relative_path,
            value_codec::encode(element),
            type_name,
        ));
    }
    records
}

/// Check a block's layout without decoding any value: marker, element count,
/// element indexes and a single owning path. Returns the shape and the path.
pub fn block_layout(block: &[Record]) -> Result<(Shape, &str), ArrayError> {
    let Some((marker, data)) = block.split_first() else {
        return Err(ArrayError::MissingMarker);
    };
    if marker.kind() != RecordKind::ArrayMarker {
        return Err(ArrayError::MissingMarker);
    }
    let shape = Shape::parse_marker(&marker.index)?;
    let expected = shape.element_count();
    if data.len() != expected {
        return Err(ArrayError::ElementCount {
            expected,
            found: data.len(),
        });
    }
    let Some(first) = data.first() else {
        return Err(ArrayError::Empty);
    };
    let path = first.relative_path.as_str();

    for (flat, record) in data.iter().enumerate() {
        let expected_index = shape.element_index(flat);
        if record.index != expected_index {
            return Err(ArrayError::UnexpectedIndex {
                expected: expected_index,
                found: record.index.clone(),
            });
        }
        if record.relative_path != path {
            return Err(ArrayError::PathMismatch {
                index: record.index.clone(),
                expected: path.to_string(),
                found: record.relative_path.clone(),
            });
        }
    }
    Ok((shape, path))
}

/// Rebuild an array from a marker record and exactly its element records.
///
/// The element type comes from the first element record and applies to all
/// elements. Returns the owning path with the array.
pub fn reconstruct(block: &[Record]) -> Result<(String, TagArray), ArrayError> {
    let (shape, path) = block_layout(block)?;
    let data = block.get(1..).unwrap_or_default();
    let first = data.first().ok_or(ArrayError::Empty)?;
    let element_type =
        ValueType::from_name(&first.data_type).ok_or_else(|| ValueError::UnsupportedType {
            type_name: first.data_type.clone(),
            raw: first.value.clone(),
        })?;

    let elements = data
        .iter()
        .map(|record| value_codec::decode(&record.value, element_type))
        .collect::<Result<Vec<_>, _>>()?;
    let array = TagArray::new(shape, element_type, elements)?;
    Ok((path.to_string(), array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int_vector(values: &[i32]) -> TagArray {
        TagArray::new(
            Shape::Vector { rows: values.len() },
            ValueType::Int32,
            values.iter().copied().map(ScalarValue::Int32).collect(),
        )
        .expect("array")
    }

    #[test]
    fn flatten_vector_matches_file_layout() {
        let records = flatten("Line.Setpoints", &int_vector(&[1, 2, 3]));
        let lines: Vec<String> = records.iter().map(|r| r.fields().join(",")).collect();
        assert_eq!(
            lines,
            vec![
                "ARRAY:3,,,",
                "0,Line.Setpoints,1,Int32",
                "1,Line.Setpoints,2,Int32",
                "2,Line.Setpoints,3,Int32",
            ]
        );
    }

    #[test]
    fn flatten_matrix_is_row_major() {
        let array = TagArray::new(
            Shape::Matrix {
                rows: 2,
                columns: 3,
            },
            ValueType::UInt8,
            (0u8..6).map(ScalarValue::UInt8).collect(),
        )
        .expect("array");
        let records = flatten("Grid", &array);
        assert_eq!(records[0].index, "ARRAY:2x3");
        let indexes: Vec<&str> = records[1..].iter().map(|r| r.index.as_str()).collect();
        assert_eq!(indexes, vec!["0.0", "0.1", "0.2", "1.0", "1.1", "1.2"]);
        assert_eq!(records[4].value, "3");
    }

    #[test]
    fn reconstruct_inverts_flatten() {
        let array = int_vector(&[1, 2, 3]);
        let (path, back) = reconstruct(&flatten("Line.Setpoints", &array)).expect("reconstruct");
        assert_eq!(path, "Line.Setpoints");
        assert_eq!(back, array);
    }

    #[test]
    fn marker_parsing() {
        assert_eq!(Shape::parse_marker("ARRAY:3"), Ok(Shape::Vector { rows: 3 }));
        assert_eq!(
            Shape::parse_marker("ARRAY:2x5"),
            Ok(Shape::Matrix {
                rows: 2,
                columns: 5
            })
        );
        for bad in [
            "ARRAY:",
            "ARRAY:x",
            "ARRAY:2x",
            "ARRAY:1x2x3",
            "ARRAY:-1",
            "ARRAY:+2",
            "ARRAY:3 ",
            "ARRAY:99999999999999999999",
            "ARRAY:4294967296x4294967296",
            "ROW:3",
        ] {
            assert!(
                matches!(Shape::parse_marker(bad), Err(ArrayError::BadMarker { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn rank_three_is_unsupported() {
        assert_eq!(
            Shape::from_dimensions(&[2, 2, 2]),
            Err(ArrayError::UnsupportedRank { rank: 3 })
        );
        assert_eq!(
            Shape::from_dimensions(&[]),
            Err(ArrayError::UnsupportedRank { rank: 0 })
        );
    }

    #[test]
    fn new_rejects_count_and_type_mismatch() {
        let err = TagArray::new(Shape::Vector { rows: 2 }, ValueType::Int32, vec![]).expect_err("count");
        assert_eq!(err, ArrayError::ElementCount { expected: 2, found: 0 });

        let err = TagArray::new(
            Shape::Vector { rows: 2 },
            ValueType::Int32,
            vec![ScalarValue::Int32(1), ScalarValue::Int64(2)],
        )
        .expect_err("types");
        assert!(matches!(err, ArrayError::MixedTypes { index: 1, .. }));
    }

    #[test]
    fn element_type_comes_from_first_row() {
        let block = vec![
            Record::new("ARRAY:2", "", "", ""),
            Record::new("0", "P", "1.5", "Float64"),
            Record::new("1", "P", "2", "Int8"),
        ];
        let (_, array) = reconstruct(&block).expect("reconstruct");
        assert_eq!(array.element_type(), ValueType::Float64);
        assert_eq!(array.elements()[1], ScalarValue::Float64(2.0));
    }

    #[test]
    fn interleaved_path_is_rejected() {
        let block = vec![
            Record::new("ARRAY:2", "", "", ""),
            Record::new("0", "A", "1", "Int32"),
            Record::new("1", "B", "2", "Int32"),
        ];
        assert!(matches!(
            reconstruct(&block),
            Err(ArrayError::PathMismatch { .. })
        ));
    }

    #[test]
    fn wrong_element_index_is_rejected() {
        let block = vec![
            Record::new("ARRAY:1x2", "", "", ""),
            Record::new("0.0", "A", "1", "Int32"),
            Record::new("1.0", "A", "2", "Int32"),
        ];
        assert_eq!(
            reconstruct(&block),
            Err(ArrayError::UnexpectedIndex {
                expected: "0.1".to_string(),
                found: "1.0".to_string(),
            })
        );
    }

    #[test]
    fn truncated_block_is_rejected() {
        let block = vec![
            Record::new("ARRAY:3", "", "", ""),
            Record::new("0", "A", "1", "Int32"),
        ];
        assert_eq!(
            reconstruct(&block),
            Err(ArrayError::ElementCount { expected: 3, found: 1 })
        );
    }

    #[test]
    fn unknown_element_type_is_unsupported() {
        let block = vec![
            Record::new("ARRAY:1", "", "", ""),
            Record::new("0", "A", "x", "Guid"),
        ];
        assert!(matches!(
            reconstruct(&block),
            Err(ArrayError::Value(ValueError::UnsupportedType { .. }))
        ));
    }

    proptest! {
        #[test]
        fn matrices_round_trip(rows in 1usize..5, columns in 1usize..5, seed in any::<i64>()) {
            let elements: Vec<ScalarValue> = (0..rows * columns)
                .map(|i| ScalarValue::Float64(seed.wrapping_add(i as i64) as f64 / 7.0))
                .collect();
            let array = TagArray::new(Shape::Matrix { rows, columns }, ValueType::Float64, elements)
                .expect("array");
            let (path, back) = reconstruct(&flatten("M", &array)).expect("reconstruct");
            prop_assert_eq!(path, "M");
            prop_assert!(back.same_as(&array));
        }

        #[test]
        fn vectors_round_trip((element_type, elements) in typed_elements()) {
            let array = TagArray::new(
                Shape::Vector { rows: elements.len() },
                element_type,
                elements,
            )
            .expect("array");
            let (path, back) = reconstruct(&flatten("V", &array)).expect("reconstruct");
            prop_assert_eq!(path, "V");
            prop_assert!(back.same_as(&array));
        }
    }

    /// A non-empty element list of one randomly chosen type.
    fn typed_elements() -> impl Strategy<Value = (ValueType, Vec<ScalarValue>)> {
        let sizes = 1usize..6;
        prop_oneof![
            prop::collection::vec(any::<i8>().prop_map(ScalarValue::Int8), sizes.clone())
                .prop_map(|v| (ValueType::Int8, v)),
            prop::collection::vec(any::<i64>().prop_map(ScalarValue::Int64), sizes.clone())
                .prop_map(|v| (ValueType::Int64, v)),
            prop::collection::vec(any::<u16>().prop_map(ScalarValue::UInt16), sizes.clone())
                .prop_map(|v| (ValueType::UInt16, v)),
            prop::collection::vec(any::<u64>().prop_map(ScalarValue::UInt64), sizes.clone())
                .prop_map(|v| (ValueType::UInt64, v)),
            prop::collection::vec(any::<bool>().prop_map(ScalarValue::Bool), sizes.clone())
                .prop_map(|v| (ValueType::Bool, v)),
            prop::collection::vec(
                any::<f32>()
                    .prop_filter("finite", |v| v.is_finite())
                    .prop_map(ScalarValue::Float32),
                sizes.clone()
            )
            .prop_map(|v| (ValueType::Float32, v)),
            prop::collection::vec(
                "[ -~]{0,12}".prop_map(ScalarValue::String),
                sizes.clone()
            )
            .prop_map(|v| (ValueType::String, v)),
            prop::collection::vec(
                (0i64..253_402_300_800, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
                    ScalarValue::Timestamp(
                        chrono::DateTime::from_timestamp(secs, nanos).expect("in range"),
                    )
                }),
                sizes
            )
            .prop_map(|v| (ValueType::Timestamp, v)),
        ]
    }
}
