use async_trait::async_trait;
use ns_compiler::{BoundCommand, CommandDescriptor, ParamSpec, Validator};
use ns_core::{ExecutionFrame, NarrativeError};
use ns_parser::{ParamKind, Parameter};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandError, CommandOutcome, JumpTarget};
use crate::helpers::rhai_bridge::eval_condition;

fn label_param() -> ParamSpec {
    ParamSpec::new("label", ParamKind::String)
        .alias("target")
        .required()
        .positional()
        .validate(Validator::NonEmpty)
}

/// Resolves a label name or fails with `COMMAND_LABEL_UNKNOWN`.
fn known_label(context: &CommandContext<'_>, label: &str) -> Result<usize, CommandError> {
    context.execution.find_label(label).ok_or_else(|| {
        CommandError::Context(NarrativeError::new(
            "COMMAND_LABEL_UNKNOWN",
            format!("Label \"{}\" is not defined.", label),
        ))
    })
}

fn label_value<'a>(parameter: &'a Parameter<String>) -> Result<&'a str, CommandError> {
    parameter
        .value()
        .map(String::as_str)
        .ok_or_else(|| CommandError::invalid("label", "no value"))
}

#[derive(Debug)]
pub struct GotoCommand {
    descriptor: CommandDescriptor,
    label: Parameter<String>,
}

impl GotoCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("goto", "flow")
            .alias("jump")
            .param(label_param())
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            label: bound.parameters.typed("label"),
        })
    }
}

#[async_trait]
impl Command for GotoCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let label = label_value(&self.label)?;
        known_label(context, label)?;
        Ok(CommandOutcome::Jump(JumpTarget::Label(label.to_string())))
    }
}

/// Pushes a return frame for the next line and jumps to the label.
#[derive(Debug)]
pub struct CallCommand {
    descriptor: CommandDescriptor,
    label: Parameter<String>,
}

impl CallCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("call", "flow")
            .alias("gosub")
            .param(label_param())
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            label: bound.parameters.typed("label"),
        })
    }
}

#[async_trait]
impl Command for CallCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let label = label_value(&self.label)?;
        known_label(context, label)?;
        let frame = ExecutionFrame {
            script_name: context.script_name().to_string(),
            call_line_index: context.line_index,
            return_line_index: context.line_index + 1,
            label: Some(label.to_string()),
        };
        context
            .execution
            .push_frame(frame)
            .map_err(|_| CommandError::CallStackOverflow {
                depth: context.execution.call_depth(),
            })?;
        Ok(CommandOutcome::Jump(JumpTarget::Label(label.to_string())))
    }
}

#[derive(Debug)]
pub struct ReturnCommand {
    descriptor: CommandDescriptor,
}

impl ReturnCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("return", "flow")
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
        })
    }
}

#[async_trait]
impl Command for ReturnCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let frame = context.execution.pop_frame().ok_or_else(|| {
            CommandError::Context(NarrativeError::new(
                "COMMAND_RETURN_EMPTY_STACK",
                "return without a matching call.",
            ))
        })?;
        Ok(CommandOutcome::Jump(JumpTarget::Line(frame.return_line_index)))
    }
}

/// `@if "<condition>" goto:<label> [else:<label>]`; the condition is a rhai
/// expression over script variables.
#[derive(Debug)]
pub struct IfCommand {
    descriptor: CommandDescriptor,
    condition: Parameter<String>,
    then_label: Parameter<String>,
    else_label: Parameter<String>,
}

impl IfCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("if", "flow")
            .param(
                ParamSpec::new("cond", ParamKind::String)
                    .alias("condition")
                    .required()
                    .positional()
                    .validate(Validator::NonEmpty),
            )
            .param(ParamSpec::new("goto", ParamKind::String).alias("then"))
            .param(ParamSpec::new("else", ParamKind::String))
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            condition: bound.parameters.typed("cond"),
            then_label: bound.parameters.typed("goto"),
            else_label: bound.parameters.typed("else"),
        })
    }
}

#[async_trait]
impl Command for IfCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let condition = self
            .condition
            .value()
            .ok_or_else(|| CommandError::invalid("cond", "no value"))?;
        let branch = if eval_condition(condition, context.execution.variables())? {
            self.then_label.value()
        } else {
            self.else_label.value()
        };
        match branch {
            Some(label) => {
                known_label(context, label)?;
                Ok(CommandOutcome::Jump(JumpTarget::Label(label.clone())))
            }
            None => Ok(CommandOutcome::Completed),
        }
    }
}

/// `@repeat label:<label> times:<n>` placed after a block runs the block
/// `n` times in total. The pass count lives in the context's loop counters,
/// keyed by this line, so it survives snapshots.
#[derive(Debug)]
pub struct RepeatCommand {
    descriptor: CommandDescriptor,
    label: Parameter<String>,
    times: Parameter<i64>,
}

impl RepeatCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("repeat", "flow")
            .alias("loop")
            .param(label_param())
            .param(
                ParamSpec::new("times", ParamKind::Integer)
                    .alias("count")
                    .required()
                    .validate(Validator::Range {
                        min: 1.0,
                        max: 10_000.0,
                    }),
            )
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            label: bound.parameters.typed("label"),
            times: bound.parameters.typed("times"),
        })
    }
}

#[async_trait]
impl Command for RepeatCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let label = label_value(&self.label)?;
        let times = self
            .times
            .value()
            .copied()
            .ok_or_else(|| CommandError::invalid("times", "no value"))?;
        known_label(context, label)?;

        let line = context.line_index;
        let pass = context.execution.increment_loop_counter(line);
        if i64::from(pass) < times {
            return Ok(CommandOutcome::Loop {
                target: JumpTarget::Label(label.to_string()),
                iteration: pass,
            });
        }
        context.execution.reset_loop_counter(line);
        Ok(CommandOutcome::Completed)
    }
}

#[derive(Debug)]
pub struct StopCommand {
    descriptor: CommandDescriptor,
}

impl StopCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("stop", "flow")
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
        })
    }
}

#[async_trait]
impl Command for StopCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        Ok(CommandOutcome::Terminate)
    }
}

/// Asks the driving loop to pause once this line completes.
#[derive(Debug)]
pub struct PauseCommand {
    descriptor: CommandDescriptor,
}

impl PauseCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("pause", "flow").alias("breakpoint")
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
        })
    }
}

#[async_trait]
impl Command for PauseCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        context.execution.request_pause();
        Ok(CommandOutcome::Completed)
    }
}
