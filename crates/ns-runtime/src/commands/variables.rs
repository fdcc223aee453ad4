use async_trait::async_trait;
use ns_compiler::{BoundCommand, CommandDescriptor, ParamSpec, Validator};
use ns_core::{clamp_number, numeric_add, FallbackAction, NarrativeError, Number, NsValue, RetryStrategy};
use ns_parser::{ParamKind, Parameter};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandError, CommandOutcome};
use crate::helpers::rhai_bridge::eval_expression;
use crate::services::{PersistentVariableService, PERSISTENT_VARIABLES_CAPABILITY};

fn variable_param() -> ParamSpec {
    ParamSpec::new("variable", ParamKind::String)
        .alias("var")
        .required()
        .validate(Validator::NonEmpty)
}

fn required_text<'a>(parameter: &'a Parameter<String>, name: &str) -> Result<&'a str, CommandError> {
    parameter
        .value()
        .map(String::as_str)
        .ok_or_else(|| CommandError::invalid(name, "no value"))
}

/// `@set var:<name> val:<literal>` or `@set var:<name> expr:<rhai>`.
///
/// Unquoted values are read as literals (`100` is an integer, `true` a
/// boolean); quoted values always stay text.
#[derive(Debug)]
pub struct SetCommand {
    descriptor: CommandDescriptor,
    variable: Parameter<String>,
    value: Parameter<String>,
    expr: Parameter<String>,
}

impl SetCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("set", "variables")
            .param(variable_param())
            .param(ParamSpec::new("value", ParamKind::String).alias("val"))
            .param(ParamSpec::new("expr", ParamKind::String).validate(Validator::NonEmpty))
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            variable: bound.parameters.typed("variable"),
            value: bound.parameters.typed("value"),
            expr: bound.parameters.typed("expr"),
        })
    }
}

#[async_trait]
impl Command for SetCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let name = required_text(&self.variable, "variable")?;
        let value = match (self.value.value(), self.expr.value()) {
            (Some(text), None) if self.value.is_quoted() => NsValue::String(text.clone()),
            (Some(text), None) => NsValue::parse_literal(text),
            (None, Some(expr)) => eval_expression(expr, context.execution.variables())?,
            (Some(_), Some(_)) => {
                return Err(CommandError::invalid(
                    "value",
                    "give either a value or an expr, not both",
                ))
            }
            (None, None) => {
                return Err(CommandError::invalid("value", "set needs a value or an expr"))
            }
        };
        tracing::debug!(script = context.script_name(), line = context.line_index, variable = name, value = %value, "set variable");
        context.execution.set_variable(name, value);
        Ok(CommandOutcome::Completed)
    }
}

/// `@add var:<name> amount:<number> [min:<number>] [max:<number>]`.
#[derive(Debug)]
pub struct AddCommand {
    descriptor: CommandDescriptor,
    variable: Parameter<String>,
    amount: Parameter<f64>,
    min: Parameter<f64>,
    max: Parameter<f64>,
}

impl AddCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("add", "variables")
            .param(variable_param())
            .param(ParamSpec::new("amount", ParamKind::Decimal).alias("by").required())
            .param(ParamSpec::new("min", ParamKind::Decimal))
            .param(ParamSpec::new("max", ParamKind::Decimal))
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            variable: bound.parameters.typed("variable"),
            amount: bound.parameters.typed("amount"),
            min: bound.parameters.typed("min"),
            max: bound.parameters.typed("max"),
        })
    }
}

#[async_trait]
impl Command for AddCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let name = required_text(&self.variable, "variable")?;
        let amount = self
            .amount
            .value()
            .copied()
            .ok_or_else(|| CommandError::invalid("amount", "no value"))?;
        let (min, max) = (self.min.value().copied(), self.max.value().copied());
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(CommandError::invalid(
                    "min",
                    format!("min {} is greater than max {}", min, max),
                ));
            }
        }

        let current = context
            .execution
            .variable(name)
            .cloned()
            .unwrap_or(NsValue::Null);
        let sum = numeric_add(&current, Number::Float(amount))?;
        let sum = sum.as_number().ok_or_else(|| {
            NarrativeError::new("VALUE_NOT_NUMERIC", "Addition produced a non-numeric value.")
        })?;
        let result = clamp_number(sum, min, max).into_value();
        context.execution.set_variable(name, result);
        Ok(CommandOutcome::Completed)
    }
}

/// `@persist var:<name> [key:<storage key>]` stores a variable through the
/// persistent-variable capability.
#[derive(Debug)]
pub struct PersistCommand {
    descriptor: CommandDescriptor,
    variable: Parameter<String>,
    key: Parameter<String>,
}

impl PersistCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("persist", "persistence")
            .alias("save_var")
            .retry(2, RetryStrategy::Exponential)
            .fallback(FallbackAction::Abort)
            .critical()
            .param(variable_param())
            .param(ParamSpec::new("key", ParamKind::String).validate(Validator::NonEmpty))
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            variable: bound.parameters.typed("variable"),
            key: bound.parameters.typed("key"),
        })
    }
}

#[async_trait]
impl Command for PersistCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let name = required_text(&self.variable, "variable")?;
        let key = self.key.value().map(String::as_str).unwrap_or(name);
        let value = context
            .execution
            .variable(name)
            .cloned()
            .ok_or_else(|| CommandError::failed(format!("variable \"{}\" is not set", name)))?;
        let store = context
            .services
            .require::<dyn PersistentVariableService>(PERSISTENT_VARIABLES_CAPABILITY)?;
        store.store(key, &value)?;
        Ok(CommandOutcome::Completed)
    }
}
