//! Typed value encoding for the `Value` and `DataType` columns.
//!
//! Encoding is chosen so that `decode(encode(v)) == v` for every scalar:
//! floats use the shortest significant-digit count that always round-trips
//! IEEE-754 (9 for single, 17 for double) and timestamps keep nanoseconds.

use std::fmt::{Display, Write};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::core::types::{ScalarValue, ValueType};

/// Significant digits that round-trip an `f32`.
pub const FLOAT32_DIGITS: usize = 9;
/// Significant digits that round-trip an `f64`.
pub const FLOAT64_DIGITS: usize = 17;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The `DataType` column names no known value type.
    #[error("type not found: {type_name} (value {raw:?})")]
    UnsupportedType { type_name: String, raw: String },

    #[error("invalid {value_type} value {raw:?}: {reason}")]
    InvalidValue {
        value_type: ValueType,
        raw: String,
        reason: String,
    },
}

/// Render a scalar in its canonical, locale-invariant text form.
pub fn encode(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Int8(v) => v.to_string(),
        ScalarValue::Int16(v) => v.to_string(),
        ScalarValue::Int32(v) => v.to_string(),
        ScalarValue::Int64(v) => v.to_string(),
        ScalarValue::UInt8(v) => v.to_string(),
        ScalarValue::UInt16(v) => v.to_string(),
        ScalarValue::UInt32(v) => v.to_string(),
        ScalarValue::UInt64(v) => v.to_string(),
        ScalarValue::Bool(v) => v.to_string(),
        ScalarValue::Float32(v) => format_general(f64::from(*v), FLOAT32_DIGITS),
        ScalarValue::Float64(v) => format_general(*v, FLOAT64_DIGITS),
        ScalarValue::String(v) => v.clone(),
        ScalarValue::Timestamp(v) => v.to_rfc3339_opts(SecondsFormat::Nanos, true),
    }
}

/// Parse `raw` as a value of `value_type`.
pub fn decode(raw: &str, value_type: ValueType) -> Result<ScalarValue, ValueError> {
    match value_type {
        ValueType::Int8 => parse_number(raw, value_type, ScalarValue::Int8),
        ValueType::Int16 => parse_number(raw, value_type, ScalarValue::Int16),
        ValueType::Int32 => parse_number(raw, value_type, ScalarValue::Int32),
        ValueType::Int64 => parse_number(raw, value_type, ScalarValue::Int64),
        ValueType::UInt8 => parse_number(raw, value_type, ScalarValue::UInt8),
        ValueType::UInt16 => parse_number(raw, value_type, ScalarValue::UInt16),
        ValueType::UInt32 => parse_number(raw, value_type, ScalarValue::UInt32),
        ValueType::UInt64 => parse_number(raw, value_type, ScalarValue::UInt64),
        ValueType::Float32 => parse_number(raw, value_type, ScalarValue::Float32),
        ValueType::Float64 => parse_number(raw, value_type, ScalarValue::Float64),
        ValueType::Bool => parse_bool(raw),
        ValueType::String => Ok(ScalarValue::String(raw.to_string())),
        ValueType::Timestamp => parse_timestamp(raw),
    }
}

/// Parse `raw` using the type named in a `DataType` column.
pub fn decode_named(raw: &str, type_name: &str) -> Result<ScalarValue, ValueError> {
    let value_type =
        ValueType::from_name(type_name).ok_or_else(|| ValueError::UnsupportedType {
            type_name: type_name.to_string(),
            raw: raw.to_string(),
        })?;
    decode(raw, value_type)
}

fn parse_number<T>(
    raw: &str,
    value_type: ValueType,
    wrap: fn(T) -> ScalarValue,
) -> Result<ScalarValue, ValueError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map(wrap)
        .map_err(|err| invalid(raw, value_type, err))
}

fn parse_bool(raw: &str) -> Result<ScalarValue, ValueError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(ScalarValue::Bool(true))
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(ScalarValue::Bool(false))
    } else {
        Err(invalid(raw, ValueType::Bool, "expected true or false"))
    }
}

/// Accepts RFC 3339 with any offset, or an offset-less ISO-8601 form taken as UTC.
///
/// Years outside 0000-9999 are written with a sign (`+10000-…`, `-0001-…`),
/// which RFC 3339 does not allow; those go through the ISO-8601 path with
/// the `Z` suffix removed.
fn parse_timestamp(raw: &str) -> Result<ScalarValue, ValueError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ScalarValue::Timestamp(parsed.with_timezone(&Utc)));
    }
    let naive = trimmed.strip_suffix(['Z', 'z']).unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| ScalarValue::Timestamp(naive.and_utc()))
        .map_err(|err| invalid(raw, ValueType::Timestamp, err))
}

fn invalid(raw: &str, value_type: ValueType, reason: impl Display) -> ValueError {
    ValueError::InvalidValue {
        value_type,
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// General numeric format with `precision` significant digits.
///
/// Fixed notation is used while the decimal exponent lies in
/// `-5 < exp < precision`, scientific (`1.5E+20`, `1E-05`) otherwise.
/// Trailing fractional zeros are dropped.
pub fn format_general(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        return text.to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    let all_digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let trimmed = all_digits.trim_end_matches('0');
    let digits = if trimmed.is_empty() { "0" } else { trimmed };

    let mut out = String::with_capacity(precision + 8);
    if mantissa.starts_with('-') {
        out.push('-');
    }

    let max_fixed = i32::try_from(precision).unwrap_or(i32::MAX);
    if exponent > -5 && exponent < max_fixed {
        if exponent >= 0 {
            let int_len = exponent.unsigned_abs() as usize + 1;
            if digits.len() <= int_len {
                out.push_str(digits);
                out.extend(std::iter::repeat_n('0', int_len - digits.len()));
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat_n('0', exponent.unsigned_abs() as usize - 1));
            out.push_str(digits);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        let _ = write!(out, "E{}{:02}", sign, exponent.unsigned_abs());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn round_trip(value: ScalarValue) -> ScalarValue {
        decode(&encode(&value), value.value_type()).expect("decode")
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn float64_keeps_seventeen_significant_digits() {
        assert_eq!(encode(&ScalarValue::Float64(3.14159265358979)), "3.14159265358979");
        assert_eq!(
            encode(&ScalarValue::Float64(std::f64::consts::PI)),
            "3.1415926535897931"
        );
        assert_eq!(encode(&ScalarValue::Float64(0.1)), "0.10000000000000001");
    }

    #[test]
    fn float32_uses_nine_digits() {
        assert_eq!(encode(&ScalarValue::Float32(0.1)), "0.100000001");
        assert_eq!(encode(&ScalarValue::Float32(1.5)), "1.5");
    }

    #[test]
    fn general_format_switches_to_scientific() {
        assert_eq!(format_general(1e20, 17), "1E+20");
        assert_eq!(format_general(2f64.powi(-20), 17), "9.5367431640625E-07");
        assert_eq!(format_general(0.0001, 17), "0.0001");
        assert_eq!(format_general(123456789.0, 9), "123456789");
        assert_eq!(format_general(1234567890.0, 9), "1.23456789E+09");
    }

    #[test]
    fn general_format_handles_zero_and_specials() {
        assert_eq!(format_general(0.0, 17), "0");
        assert_eq!(format_general(-0.0, 17), "-0");
        assert_eq!(format_general(-2.5, 17), "-2.5");
        assert_eq!(format_general(100.0, 17), "100");
        assert_eq!(format_general(f64::NAN, 17), "NaN");
        assert_eq!(format_general(f64::NEG_INFINITY, 17), "-Infinity");
    }

    #[test]
    fn special_floats_round_trip() {
        let back = round_trip(ScalarValue::Float64(f64::NAN));
        assert!(matches!(back, ScalarValue::Float64(v) if v.is_nan()));
        for value in [f64::INFINITY, f64::NEG_INFINITY, -0.0, f64::MIN_POSITIVE] {
            let back = round_trip(ScalarValue::Float64(value));
            assert!(back.same_as(&ScalarValue::Float64(value)), "{value}");
        }
        let back = round_trip(ScalarValue::Float32(f32::MAX));
        assert!(back.same_as(&ScalarValue::Float32(f32::MAX)));
    }

    #[test]
    fn integer_extremes_round_trip() {
        for value in [
            ScalarValue::Int8(i8::MIN),
            ScalarValue::Int16(i16::MAX),
            ScalarValue::Int32(i32::MIN),
            ScalarValue::Int64(i64::MIN),
            ScalarValue::UInt8(u8::MAX),
            ScalarValue::UInt16(u16::MAX),
            ScalarValue::UInt32(u32::MAX),
            ScalarValue::UInt64(u64::MAX),
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn timestamp_keeps_nanoseconds_in_utc() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 45)
            .single()
            .expect("valid date")
            + chrono::Duration::nanoseconds(123_456_789);
        let encoded = encode(&ScalarValue::Timestamp(ts));
        assert_eq!(encoded, "2024-03-01T12:30:45.123456789Z");
        assert_eq!(round_trip(ScalarValue::Timestamp(ts)), ScalarValue::Timestamp(ts));
    }

    #[test]
    fn timestamp_outside_four_digit_years_round_trips() {
        for year in [10000, -1, 0, 1, 9999] {
            let ts = Utc
                .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
                .single()
                .expect("valid date")
                + chrono::Duration::nanoseconds(42);
            let value = ScalarValue::Timestamp(ts);
            assert_eq!(round_trip(value.clone()), value, "year {year}");
        }
        assert_eq!(
            encode(&ScalarValue::Timestamp(
                Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).single().expect("valid date")
            )),
            "+10000-01-01T00:00:00.000000000Z"
        );
    }

    #[test]
    fn timestamp_with_offset_normalizes_to_utc() {
        let decoded = decode("2024-03-01T14:30:45.5+02:00", ValueType::Timestamp).expect("decode");
        let expected = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 45)
            .single()
            .expect("valid date")
            + chrono::Duration::milliseconds(500);
        assert_eq!(decoded, ScalarValue::Timestamp(expected));
    }

    #[test]
    fn timestamp_without_offset_is_taken_as_utc() {
        let decoded = decode("2023-12-31T23:59:59.0000001", ValueType::Timestamp).expect("decode");
        let ScalarValue::Timestamp(ts) = decoded else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.to_rfc3339_opts(SecondsFormat::Nanos, true), "2023-12-31T23:59:59.000000100Z");
    }

    #[test]
    fn bool_parse_is_case_insensitive() {
        assert_eq!(decode("True", ValueType::Bool), Ok(ScalarValue::Bool(true)));
        assert_eq!(decode(" false ", ValueType::Bool), Ok(ScalarValue::Bool(false)));
        assert!(decode("yes", ValueType::Bool).is_err());
        assert_eq!(encode(&ScalarValue::Bool(true)), "true");
    }

    #[test]
    fn strings_are_verbatim() {
        let value = ScalarValue::String("  a,\"b\" ".to_string());
        assert_eq!(encode(&value), "  a,\"b\" ");
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn out_of_range_integer_is_invalid_value() {
        let err = decode("300", ValueType::UInt8).expect_err("overflow");
        assert!(matches!(
            err,
            ValueError::InvalidValue {
                value_type: ValueType::UInt8,
                ..
            }
        ));
    }

    #[test]
    fn unknown_type_name_is_unsupported_type() {
        let err = decode_named("42", "Guid").expect_err("unknown type");
        assert_eq!(
            err,
            ValueError::UnsupportedType {
                type_name: "Guid".to_string(),
                raw: "42".to_string(),
            }
        );
        assert!(err.to_string().contains("type not found"));
    }

    #[test]
    fn legacy_type_names_decode() {
        assert_eq!(decode_named("2.5", "Double"), Ok(ScalarValue::Float64(2.5)));
        assert_eq!(decode_named("True", "Boolean"), Ok(ScalarValue::Bool(true)));
    }

    proptest! {
        #[test]
        fn any_f64_round_trips_bit_exact(bits in any::<u64>()) {
            let value = f64::from_bits(bits);
            prop_assume!(!value.is_nan());
            let back = round_trip(ScalarValue::Float64(value));
            prop_assert!(back.same_as(&ScalarValue::Float64(value)));
        }

        #[test]
        fn any_f32_round_trips_bit_exact(bits in any::<u32>()) {
            let value = f32::from_bits(bits);
            prop_assume!(!value.is_nan());
            let back = round_trip(ScalarValue::Float32(value));
            prop_assert!(back.same_as(&ScalarValue::Float32(value)));
        }

        #[test]
        fn any_i64_round_trips(value in any::<i64>()) {
            prop_assert_eq!(round_trip(ScalarValue::Int64(value)), ScalarValue::Int64(value));
        }

        #[test]
        fn any_timestamp_round_trips(secs in 0i64..4_102_444_800, nanos in 0u32..1_000_000_000) {
            let ts = DateTime::from_timestamp(secs, nanos).expect("in range");
            prop_assert_eq!(round_trip(ScalarValue::Timestamp(ts)), ScalarValue::Timestamp(ts));
        }
    }
}
