use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NarrativeError;

/// Dynamically typed script variable value.
///
/// Serialized adjacently tagged (`{"type":"int","value":3}`) so persisted
/// variable maps keep the distinction between numbers, booleans and text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum NsValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    /// Collapses an integral float into `Int` when it fits.
    pub fn normalized(self) -> Self {
        match self {
            Self::Float(value) if is_integral(value) => Self::Int(value as i64),
            other => other,
        }
    }

    pub fn into_value(self) -> NsValue {
        match self {
            Self::Int(value) => NsValue::Int(value),
            Self::Float(value) => NsValue::Float(value),
        }
    }
}

impl NsValue {
    /// Interprets unquoted script text the way assignment commands do.
    pub fn parse_literal(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        if looks_like_float(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                if value.is_finite() {
                    return Self::Float(value);
                }
            }
        }
        Self::String(text.to_string())
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(value) => Some(Number::Int(*value)),
            Self::Float(value) => Some(Number::Float(*value)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) => !value.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    pub fn to_display_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::String(value) => value.clone(),
        }
    }
}

impl fmt::Display for NsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_text())
    }
}

impl From<bool> for NsValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for NsValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for NsValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for NsValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for NsValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Adds `amount` to a variable's current value.
///
/// A missing (`Null`) value counts as integer zero. Integer arithmetic is
/// kept when both sides are integral; otherwise the result is a float.
pub fn numeric_add(current: &NsValue, amount: Number) -> Result<NsValue, NarrativeError> {
    let base = match current {
        NsValue::Null => Number::Int(0),
        other => other.as_number().ok_or_else(|| {
            NarrativeError::new(
                "VALUE_NOT_NUMERIC",
                format!(
                    "Cannot add to a {} value \"{}\".",
                    other.type_name(),
                    other.to_display_text()
                ),
            )
        })?,
    };

    match (base, amount.normalized()) {
        (Number::Int(left), Number::Int(right)) => left
            .checked_add(right)
            .map(NsValue::Int)
            .ok_or_else(|| {
                NarrativeError::new(
                    "VALUE_OVERFLOW",
                    format!("Integer overflow adding {} to {}.", right, left),
                )
            }),
        (left, right) => {
            let sum = left.as_f64() + right.as_f64();
            if !sum.is_finite() {
                return Err(NarrativeError::new(
                    "VALUE_OVERFLOW",
                    format!(
                        "Adding {} to {} leaves the finite number range.",
                        right.as_f64(),
                        left.as_f64()
                    ),
                ));
            }
            Ok(NsValue::Float(sum))
        }
    }
}

/// Clamps a number into `[min, max]`; integers stay integers when the
/// violated bound is itself integral.
pub fn clamp_number(value: Number, min: Option<f64>, max: Option<f64>) -> Number {
    let mut result = value;
    if let Some(min) = min {
        if result.as_f64() < min {
            result = bound_like(value, min);
        }
    }
    if let Some(max) = max {
        if result.as_f64() > max {
            result = bound_like(value, max);
        }
    }
    result
}

fn bound_like(original: Number, bound: f64) -> Number {
    match original {
        Number::Int(_) if is_integral(bound) => Number::Int(bound as i64),
        _ => Number::Float(bound),
    }
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64
}

fn looks_like_float(text: &str) -> bool {
    let body = text.strip_prefix(&['-', '+'][..]).unwrap_or(text);
    !body.is_empty()
        && body.chars().any(|ch| ch.is_ascii_digit())
        && body
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '-' | '+'))
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn parse_literal_distinguishes_kinds() {
        assert_eq!(NsValue::parse_literal("100"), NsValue::Int(100));
        assert_eq!(NsValue::parse_literal("-5"), NsValue::Int(-5));
        assert_eq!(NsValue::parse_literal("1.5"), NsValue::Float(1.5));
        assert_eq!(NsValue::parse_literal("TRUE"), NsValue::Bool(true));
        assert_eq!(NsValue::parse_literal("null"), NsValue::Null);
        assert_eq!(
            NsValue::parse_literal("inf"),
            NsValue::String("inf".to_string())
        );
        assert_eq!(
            NsValue::parse_literal("hero"),
            NsValue::String("hero".to_string())
        );
    }

    #[test]
    fn numeric_add_keeps_integers_integral() {
        let result = numeric_add(&NsValue::Int(3), Number::Float(-5.0)).expect("add");
        assert_eq!(result, NsValue::Int(-2));

        let result = numeric_add(&NsValue::Null, Number::Int(7)).expect("add to missing");
        assert_eq!(result, NsValue::Int(7));

        let result = numeric_add(&NsValue::Int(1), Number::Float(0.5)).expect("add");
        assert_eq!(result, NsValue::Float(1.5));
    }

    #[test]
    fn numeric_add_rejects_non_numeric_and_overflow() {
        let error = numeric_add(&NsValue::from("abc"), Number::Int(1)).expect_err("string");
        assert_eq!(error.code, "VALUE_NOT_NUMERIC");

        let error = numeric_add(&NsValue::Int(i64::MAX), Number::Int(1)).expect_err("overflow");
        assert_eq!(error.code, "VALUE_OVERFLOW");

        let error = numeric_add(&NsValue::Float(1e308), Number::Float(1e308))
            .expect_err("float overflow");
        assert_eq!(error.code, "VALUE_OVERFLOW");
    }

    #[test]
    fn out_of_range_float_literals_stay_text() {
        assert_eq!(
            NsValue::parse_literal("1e400"),
            NsValue::String("1e400".to_string())
        );
        assert_eq!(
            NsValue::parse_literal("-1e400"),
            NsValue::String("-1e400".to_string())
        );
        assert_eq!(NsValue::parse_literal("1e300"), NsValue::Float(1e300));
    }

    #[test]
    fn clamp_number_respects_bounds() {
        assert_eq!(clamp_number(Number::Int(-2), Some(0.0), None), Number::Int(0));
        assert_eq!(
            clamp_number(Number::Int(12), None, Some(10.5)),
            Number::Float(10.5)
        );
        assert_eq!(
            clamp_number(Number::Float(0.25), Some(0.0), Some(1.0)),
            Number::Float(0.25)
        );
    }

    #[test]
    fn tagged_serialization_round_trips_type() {
        let values = vec![
            NsValue::Null,
            NsValue::Bool(true),
            NsValue::Int(4),
            NsValue::Float(4.0),
            NsValue::from("4"),
        ];
        let json = serde_json::to_string(&values).expect("serialize");
        assert!(json.contains(r#"{"type":"int","value":4}"#));
        let back: Vec<NsValue> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, values);
    }

    #[test]
    fn truthiness_and_display() {
        assert!(!NsValue::Null.is_truthy());
        assert!(NsValue::Int(2).is_truthy());
        assert!(!NsValue::from("").is_truthy());
        assert_eq!(NsValue::Float(2.5).to_string(), "2.5");
        assert_eq!(NsValue::Null.to_string(), "");
    }
}
