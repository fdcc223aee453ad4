use std::fmt;
use std::sync::OnceLock;

use ns_core::{Color, NamedString, Vector3};
use regex::Regex;

const TRUE_WORDS: [&str; 6] = ["true", "yes", "on", "1", "enabled", "active"];
const FALSE_WORDS: [&str; 6] = ["false", "no", "off", "0", "disabled", "inactive"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Vector3,
    Color,
    StringList,
    NamedString,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Vector3(Vector3),
    Color(Color),
    StringList(Vec<String>),
    NamedString(NamedString),
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Vector3 => "vector3",
            Self::Color => "color",
            Self::StringList => "string list",
            Self::NamedString => "named string",
        }
    }

    /// Parses already-unquoted text into a value of this kind.
    pub fn parse_value_text(self, text: &str) -> Result<ParamValue, String> {
        match self {
            Self::String => Ok(ParamValue::String(text.to_string())),
            Self::Integer => parse_integer(text).map(ParamValue::Integer),
            Self::Decimal => parse_decimal(text).map(ParamValue::Decimal),
            Self::Boolean => parse_boolean(text).map(ParamValue::Boolean),
            Self::Vector3 => parse_vector3(text).map(ParamValue::Vector3),
            Self::Color => Ok(ParamValue::Color(parse_color(text))),
            Self::StringList => Ok(ParamValue::StringList(parse_string_list(text))),
            Self::NamedString => Ok(ParamValue::NamedString(parse_named_string(text))),
        }
    }
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::String(_) => ParamKind::String,
            Self::Integer(_) => ParamKind::Integer,
            Self::Decimal(_) => ParamKind::Decimal,
            Self::Boolean(_) => ParamKind::Boolean,
            Self::Vector3(_) => ParamKind::Vector3,
            Self::Color(_) => ParamKind::Color,
            Self::StringList(_) => ParamKind::StringList,
            Self::NamedString(_) => ParamKind::NamedString,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Text that parses back into an equal value.
    pub fn to_value_text(&self) -> String {
        match self {
            Self::String(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Decimal(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::Vector3(value) => format!("{},{},{}", value.x, value.y, value.z),
            Self::Color(value) => format!("{},{},{},{}", value.r, value.g, value.b, value.a),
            Self::StringList(values) => values.join(","),
            Self::NamedString(value) if value.value.is_empty() => value.name.clone(),
            Self::NamedString(value) => format!("{}.{}", value.name, value.value),
        }
    }
}

/// A Rust type that can live in a typed [`Parameter`].
pub trait ParameterValue: Sized + Clone + fmt::Debug {
    const KIND: ParamKind;

    fn from_param_value(value: ParamValue) -> Option<Self>;

    fn into_param_value(self) -> ParamValue;

    fn parse_value_text(text: &str) -> Result<Self, String> {
        let value = Self::KIND.parse_value_text(text)?;
        Self::from_param_value(value)
            .ok_or_else(|| format!("expected a {} value", Self::KIND.name()))
    }
}

macro_rules! parameter_value {
    ($ty:ty, $kind:ident) => {
        impl ParameterValue for $ty {
            const KIND: ParamKind = ParamKind::$kind;

            fn from_param_value(value: ParamValue) -> Option<Self> {
                match value {
                    ParamValue::$kind(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_param_value(self) -> ParamValue {
                ParamValue::$kind(self)
            }
        }
    };
}

parameter_value!(String, String);
parameter_value!(i64, Integer);
parameter_value!(f64, Decimal);
parameter_value!(bool, Boolean);
parameter_value!(Vector3, Vector3);
parameter_value!(Color, Color);
parameter_value!(Vec<String>, StringList);
parameter_value!(NamedString, NamedString);

/// A typed, optionally present value slot bound from script text.
///
/// An unset parameter never reads as its default: callers either check
/// [`Parameter::has_value`] or ask for an explicit fallback through
/// [`Parameter::value_or`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter<T> {
    value: Option<T>,
    raw_text: Option<String>,
    error: Option<String>,
    from_default: bool,
    quoted: bool,
}

impl<T> Default for Parameter<T> {
    fn default() -> Self {
        Self {
            value: None,
            raw_text: None,
            error: None,
            from_default: false,
            quoted: false,
        }
    }
}

impl<T: ParameterValue> Parameter<T> {
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with_value(value: T) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn from_parts(
        value: Option<T>,
        raw_text: Option<String>,
        error: Option<String>,
        from_default: bool,
        quoted: bool,
    ) -> Self {
        Self {
            value,
            raw_text,
            error,
            from_default,
            quoted,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn value_or(&self, fallback: T) -> T {
        self.value.clone().unwrap_or(fallback)
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw_text.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn is_from_default(&self) -> bool {
        self.from_default
    }

    /// Parses `text` into this slot. On failure the slot is left without a
    /// value and the reason is kept in [`Parameter::error`].
    pub fn set_value_text(&mut self, text: &str) -> Result<(), String> {
        self.raw_text = Some(text.to_string());
        self.from_default = false;
        match T::parse_value_text(text) {
            Ok(value) => {
                self.value = Some(value);
                self.error = None;
                Ok(())
            }
            Err(reason) => {
                self.value = None;
                self.error = Some(reason.clone());
                Err(reason)
            }
        }
    }
}

fn parse_integer(text: &str) -> Result<i64, String> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| format!("\"{}\" is not a valid integer", text))
}

fn parse_decimal(text: &str) -> Result<f64, String> {
    let trimmed = text.trim();
    let normalized = if thousands_regex().is_match(trimmed) {
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("\"{}\" is not a valid decimal number", text)),
    }
}

fn parse_boolean(text: &str) -> Result<bool, String> {
    let lowered = text.trim().to_ascii_lowercase();
    if TRUE_WORDS.contains(&lowered.as_str()) {
        return Ok(true);
    }
    if FALSE_WORDS.contains(&lowered.as_str()) {
        return Ok(false);
    }
    Err(format!("\"{}\" is not a recognized boolean", text))
}

fn parse_vector3(text: &str) -> Result<Vector3, String> {
    let trimmed = text.trim();
    if let Some(preset) = vector_preset(&trimmed.to_ascii_lowercase()) {
        return Ok(preset);
    }

    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed);
    let components = inner
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("\"{}\" is not a vector (expected x,y,z)", text))?;

    match components.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(format!("\"{}\" is not a vector (expected x,y,z)", text)),
    }
}

fn vector_preset(name: &str) -> Option<Vector3> {
    let preset = match name {
        "left" => Vector3::new(-4.5, 0.0, 0.0),
        "center" | "centre" | "middle" => Vector3::new(0.0, 0.0, 0.0),
        "right" => Vector3::new(4.5, 0.0, 0.0),
        "far_left" => Vector3::new(-7.0, 0.0, 0.0),
        "far_right" => Vector3::new(7.0, 0.0, 0.0),
        "top" => Vector3::new(0.0, 3.0, 0.0),
        "bottom" => Vector3::new(0.0, -3.0, 0.0),
        _ => return None,
    };
    Some(preset)
}

/// Unrecognized color text falls back to white instead of failing.
fn parse_color(text: &str) -> Color {
    let trimmed = text.trim();
    if let Some(color) = named_color(&trimmed.to_ascii_lowercase()) {
        return color;
    }
    if let Some(hex) = trimmed.strip_prefix('#') {
        if let Some(color) = hex_color(hex) {
            return color;
        }
    }
    if let Some(color) = float_color(trimmed) {
        return color;
    }
    tracing::debug!(text = trimmed, "unrecognized color, using white");
    Color::WHITE
}

fn named_color(name: &str) -> Option<Color> {
    let color = match name {
        "white" => Color::WHITE,
        "black" => Color::rgba(0.0, 0.0, 0.0, 1.0),
        "red" => Color::rgba(1.0, 0.0, 0.0, 1.0),
        "green" => Color::rgba(0.0, 1.0, 0.0, 1.0),
        "blue" => Color::rgba(0.0, 0.0, 1.0, 1.0),
        "yellow" => Color::rgba(1.0, 0.92, 0.016, 1.0),
        "cyan" => Color::rgba(0.0, 1.0, 1.0, 1.0),
        "magenta" => Color::rgba(1.0, 0.0, 1.0, 1.0),
        "gray" | "grey" => Color::rgba(0.5, 0.5, 0.5, 1.0),
        "orange" => Color::rgba(1.0, 0.5, 0.0, 1.0),
        "purple" => Color::rgba(0.5, 0.0, 0.5, 1.0),
        "pink" => Color::rgba(1.0, 0.75, 0.8, 1.0),
        "brown" => Color::rgba(0.6, 0.3, 0.0, 1.0),
        "clear" | "transparent" => Color::rgba(0.0, 0.0, 0.0, 0.0),
        _ => return None,
    };
    Some(color)
}

fn hex_color(hex: &str) -> Option<Color> {
    if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |index: usize| -> Option<f32> {
        u8::from_str_radix(&hex[index..index + 2], 16)
            .ok()
            .map(|value| f32::from(value) / 255.0)
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 1.0 };
    Some(Color::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
}

fn float_color(text: &str) -> Option<Color> {
    let components = text
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if components
        .iter()
        .any(|component| !(0.0..=1.0).contains(component))
    {
        return None;
    }
    match components.as_slice() {
        [r, g, b] => Some(Color::rgba(*r, *g, *b, 1.0)),
        [r, g, b, a] => Some(Color::rgba(*r, *g, *b, *a)),
        _ => None,
    }
}

fn parse_string_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_named_string(text: &str) -> NamedString {
    let trimmed = text.trim();
    match trimmed.split_once('.') {
        Some((name, value)) => NamedString {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        },
        None => NamedString {
            name: trimmed.to_string(),
            value: String::new(),
        },
    }
}

fn thousands_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("thousands regex")
    })
}
