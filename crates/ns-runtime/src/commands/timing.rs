use std::time::Duration;

use async_trait::async_trait;
use ns_compiler::{BoundCommand, CommandDescriptor, ParamSpec, Validator};
use ns_parser::{ParamKind, Parameter};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandError, CommandOutcome};

pub const MAX_WAIT_SECS: f64 = 3600.0;

/// Sleeps for `time` seconds divided by the playback speed.
#[derive(Debug)]
pub struct WaitCommand {
    descriptor: CommandDescriptor,
    time: Parameter<f64>,
}

impl WaitCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("wait", "timing")
            .timeout(MAX_WAIT_SECS + 100.0)
            .param(
                ParamSpec::new("time", ParamKind::Decimal)
                    .alias("seconds")
                    .required()
                    .positional()
                    .validate(Validator::Range {
                        min: 0.0,
                        max: MAX_WAIT_SECS,
                    }),
            )
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            time: bound.parameters.typed("time"),
        })
    }
}

#[async_trait]
impl Command for WaitCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let seconds = self
            .time
            .value()
            .copied()
            .ok_or_else(|| CommandError::invalid("time", "no value"))?;
        let speed = f64::from(context.execution.playback_speed());
        let scaled = if speed.is_finite() && speed > 0.0 {
            seconds / speed
        } else {
            seconds
        };
        let delay = Duration::try_from_secs_f64(scaled.clamp(0.0, MAX_WAIT_SECS))
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CommandError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(CommandOutcome::Completed),
        }
    }
}
