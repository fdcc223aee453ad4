use std::collections::BTreeMap;

use ns_core::{NarrativeError, NsValue};
use rhai::{Dynamic, Engine, ImmutableString, Scope, FLOAT, INT};

const MAX_EXPRESSION_OPERATIONS: u64 = 50_000;

pub(crate) fn nsvalue_to_dynamic(value: &NsValue) -> Dynamic {
    match value {
        NsValue::Null => Dynamic::UNIT,
        NsValue::Bool(value) => Dynamic::from_bool(*value),
        NsValue::Int(value) => Dynamic::from_int(*value as INT),
        NsValue::Float(value) => Dynamic::from_float(*value as FLOAT),
        NsValue::String(value) => Dynamic::from(value.clone()),
    }
}

pub(crate) fn dynamic_to_nsvalue(value: Dynamic) -> Result<NsValue, NarrativeError> {
    if value.is_unit() {
        return Ok(NsValue::Null);
    }
    if value.is::<bool>() {
        return Ok(NsValue::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(NsValue::Int(value.cast::<INT>() as i64));
    }
    if value.is::<FLOAT>() {
        let number = value.cast::<FLOAT>() as f64;
        if !number.is_finite() {
            return Err(NarrativeError::new(
                "COMMAND_EXPRESSION_VALUE",
                format!("Expression produced the non-finite number {}.", number),
            ));
        }
        return Ok(NsValue::Float(number));
    }
    if value.is::<ImmutableString>() {
        return Ok(NsValue::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(NsValue::String(value.cast::<char>().to_string()));
    }

    Err(NarrativeError::new(
        "COMMAND_EXPRESSION_VALUE",
        format!(
            "Expression produced an unsupported {} value.",
            value.type_name()
        ),
    ))
}

/// Variables whose names are not plain identifiers (such as `player.gold`)
/// are not visible to expressions.
fn is_rhai_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

pub(crate) fn eval_expression(
    source: &str,
    variables: &BTreeMap<String, NsValue>,
) -> Result<NsValue, NarrativeError> {
    let mut engine = Engine::new();
    engine.set_strict_variables(true);
    engine.set_max_operations(MAX_EXPRESSION_OPERATIONS);

    let mut scope = Scope::new();
    for (name, value) in variables {
        if is_rhai_identifier(name) {
            scope.push_dynamic(name.clone(), nsvalue_to_dynamic(value));
        }
    }

    let result = engine
        .eval_expression_with_scope::<Dynamic>(&mut scope, source)
        .map_err(|error| {
            NarrativeError::new(
                "COMMAND_EXPRESSION",
                format!("Expression \"{}\" failed: {}", source, error),
            )
        })?;
    dynamic_to_nsvalue(result)
}

pub(crate) fn eval_condition(
    source: &str,
    variables: &BTreeMap<String, NsValue>,
) -> Result<bool, NarrativeError> {
    Ok(eval_expression(source, variables)?.is_truthy())
}
