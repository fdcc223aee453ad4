use std::collections::BTreeMap;

use async_trait::async_trait;
use ns_compiler::{BoundCommand, CommandDescriptor, ParamSpec};
use ns_core::{ContentType, FallbackAction, RetryStrategy};
use ns_parser::{ParamKind, Parameter};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandError, CommandOutcome};
use crate::helpers::text_render::render_variables;
use crate::services::{NarrationService, PresentedLine, NARRATION_CAPABILITY};

/// `@print "<text>" [speaker:<name>]` presents a line through the narration
/// capability after substituting `{variable}` references.
#[derive(Debug)]
pub struct PrintCommand {
    descriptor: CommandDescriptor,
    text: Parameter<String>,
    speaker: Parameter<String>,
}

impl PrintCommand {
    pub fn descriptor() -> CommandDescriptor {
        CommandDescriptor::new("print", "dialogue")
            .retry(2, RetryStrategy::Linear)
            .fallback(FallbackAction::Continue)
            .param(ParamSpec::new("text", ParamKind::String).required().positional())
            .param(ParamSpec::new("speaker", ParamKind::String).alias("as"))
    }

    pub fn from_bound(bound: &BoundCommand) -> Box<dyn Command> {
        Box::new(Self {
            descriptor: bound.descriptor.clone(),
            text: bound.parameters.typed("text"),
            speaker: bound.parameters.typed("speaker"),
        })
    }
}

#[async_trait]
impl Command for PrintCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError> {
        let text = self
            .text
            .value()
            .ok_or_else(|| CommandError::invalid("text", "no value"))?;
        let speaker = self
            .speaker
            .value()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let narration = context
            .services
            .require::<dyn NarrationService>(NARRATION_CAPABILITY)?;

        let line = PresentedLine {
            script: context.script_name().to_string(),
            line_index: context.line_index,
            content_type: if speaker.is_some() {
                ContentType::CharacterSpeech
            } else {
                ContentType::Narration
            },
            speaker,
            text: render_variables(text, context.execution.variables()),
            attributes: BTreeMap::new(),
        };
        narration.present(&line, cancel).await?;
        Ok(CommandOutcome::Completed)
    }
}
