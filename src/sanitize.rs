//! Column-type driven coercion of values into literal SQL fragments.
//!
//! Two modes exist. [`SanitizeMode::Compatible`] reproduces the historical
//! behaviour exactly:
//!
//! - TEXT values are wrapped in double quotes with no escaping, so a value
//!   containing `"` breaks out of the literal. SQLite also resolves a
//!   double-quoted token as a column name first, so a text value equal to a
//!   column name reads that column.
//! - INTEGER, REAL and NUMERIC values that fail to parse become the bare token
//!   `NaN`, which the engine then rejects when the statement runs.
//!
//! [`SanitizeMode::Strict`] emits single-quoted, `''`-escaped text literals,
//! renders nulls as `NULL`, and rejects non-numeric input for numeric columns.

use std::{borrow::Cow, collections::HashMap};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    schema::{ColumnInfo, TypeClass},
    value::Value,
    Error, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    #[default]
    Compatible,
    Strict,
}

/// Coerce `value` into a literal fragment for a column of `type_class`.
///
/// Returns `None` only in strict mode, when a numeric column receives a value
/// that does not parse as a finite number.
pub fn sanitize(type_class: TypeClass, value: &Value, mode: SanitizeMode) -> Option<String> {
    if mode == SanitizeMode::Strict && value.is_null() {
        return Some("NULL".to_string());
    }

    let number = match type_class {
        TypeClass::Text => return Some(quote_text(&raw_text(value), mode)),
        TypeClass::Blob => return Some(blob_literal(value, mode)),
        TypeClass::Integer => match value {
            Value::Integer(value) => return Some(value.to_string()),
            _ => parse_int(&raw_text(value)),
        },
        TypeClass::Real => match value {
            Value::Integer(value) => return Some(value.to_string()),
            _ => parse_float(&raw_text(value)),
        },
        TypeClass::Numeric => match value {
            Value::Integer(value) => return Some(value.to_string()),
            _ => to_number(value),
        },
    };

    if mode == SanitizeMode::Strict && !number.is_finite() {
        return None;
    }
    Some(number_to_string(number))
}

/// Sanitize `values` positionally against `columns` of `table`.
///
/// Fails on the first column name missing from `columns`.
pub fn sanitize_values(
    columns: &HashMap<String, ColumnInfo>,
    table: &str,
    names: &[&str],
    values: &[Value],
    mode: SanitizeMode,
) -> Result<Vec<String>> {
    if names.len() != values.len() {
        return Err(Error::ValueCount {
            columns: names.len(),
            values: values.len(),
        });
    }

    let fragments = names
        .iter()
        .zip(values)
        .map(|(name, value)| {
            let column = columns.get(*name).ok_or_else(|| Error::MissingColumn {
                table: table.to_string(),
                column: (*name).to_string(),
            })?;
            sanitize(column.type_class(), value, mode).ok_or_else(|| Error::InvalidNumber {
                column: (*name).to_string(),
                value: raw_text(value).into_owned(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("sanitized {table} values: {fragments:?}");
    Ok(fragments)
}

/// Text form of a value as it would be interpolated into a string.
fn raw_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed("null"),
        Value::Integer(value) => Cow::Owned(value.to_string()),
        Value::Real(value) => Cow::Owned(number_to_string(*value)),
        Value::Text(value) => Cow::Borrowed(value),
        Value::Blob(bytes) => String::from_utf8_lossy(bytes),
        Value::Boolean(value) => Cow::Borrowed(if *value { "true" } else { "false" }),
    }
}

fn quote_text(text: &str, mode: SanitizeMode) -> String {
    match mode {
        SanitizeMode::Compatible => format!("\"{text}\""),
        SanitizeMode::Strict => format!("'{}'", text.replace('\'', "''")),
    }
}

fn blob_literal(value: &Value, mode: SanitizeMode) -> String {
    match value {
        Value::Blob(bytes) => {
            let hex = bytes.iter().map(|byte| format!("{byte:02X}")).collect::<String>();
            format!("X'{hex}'")
        }
        Value::Text(text) if mode == SanitizeMode::Strict => quote_text(text, mode),
        _ => raw_text(value).into_owned(),
    }
}

/// Leading-prefix integer parse: optional sign, optional `0x`, then digits.
fn parse_int(text: &str) -> f64 {
    let text = text.trim_start();
    let (negative, text) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, text) = match text.get(..2) {
        Some("0x" | "0X") => (16, &text[2..]),
        _ => (10, text),
    };

    let len = text
        .find(|c: char| c.to_digit(radix).is_none())
        .unwrap_or(text.len());
    if len == 0 {
        return f64::NAN;
    }
    let digits = &text[..len];
    // Decimal digits are rounded once, as a whole.
    let magnitude = if radix == 10 {
        digits.parse().unwrap_or(f64::NAN)
    } else {
        digits.chars().fold(0.0, |acc, c| {
            acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or_default())
        })
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Leading-prefix float parse, accepting `Infinity` and exponents.
fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    if unsigned.starts_with("Infinity") {
        return if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    match decimal_prefix_len(text) {
        0 => f64::NAN,
        len => text[..len].parse().unwrap_or(f64::NAN),
    }
}

/// Whole-value numeric coercion. Empty text is zero, booleans are 0 or 1.
fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Boolean(value) => f64::from(u8::from(*value)),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(value) => *value as f64,
        Value::Real(value) => *value,
        Value::Text(_) | Value::Blob(_) => text_to_number(&raw_text(value)),
    }
}

fn text_to_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }

    match text {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match text.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &text[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        return digits.chars().try_fold(0.0, |acc, c| {
            c.to_digit(radix)
                .map(|digit| acc * f64::from(radix) + f64::from(digit))
        })
        .unwrap_or(f64::NAN);
    }

    if decimal_prefix_len(text) == text.len() {
        text.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Length of the longest prefix of `text` that is a decimal literal
/// (`[+-]digits[.digits][e[+-]digits]`), or 0 when there is none.
fn decimal_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let digits_from = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_digit) {
            at += 1;
        }
        at
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let mantissa_start = end;
    end = digits_from(end);
    let mut mantissa_digits = end - mantissa_start;

    if bytes.get(end) == Some(&b'.') {
        let fraction_end = digits_from(end + 1);
        let fraction_digits = fraction_end - (end + 1);
        if mantissa_digits + fraction_digits > 0 {
            mantissa_digits += fraction_digits;
            end = fraction_end;
        }
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_end = digits_from(exponent);
        if exponent_end > exponent {
            end = exponent_end;
        }
    }
    end
}

/// Decimal text of a number; non-finite values become `NaN`, `Infinity` or
/// `-Infinity`.
fn number_to_string(number: f64) -> String {
    if number.is_nan() {
        return "NaN".to_string();
    }
    if number.is_infinite() {
        return if number > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if number == 0.0 {
        return "0".to_string();
    }

    // Display prints the shortest digits that round-trip, zero padded.
    if (1e-6..1e21).contains(&number.abs()) {
        return number.to_string();
    }

    let exponential = format!("{number:e}");
    match exponential.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exponential,
    }
}
