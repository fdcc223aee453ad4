use ns_compiler::{CompiledLineKind, CompiledScript};
use ns_core::{ContextSnapshot, LineLocation, LineMetadata, NarrativeError, PlaybackState};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandError, CommandOutcome, JumpTarget};
use crate::context::ExecutionContext;
use crate::helpers::text_render::render_variables;
use crate::options::{BindingErrorPolicy, InterpreterOptions};
use crate::registry::CommandRegistry;
use crate::resilience::{execute_with_policy, ResiliencePolicy, Resolution};
use crate::services::{NarrationService, PresentedLine, ServiceRegistry};

/// Why a `run` or `step` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    Completed,
    /// Paused before executing the breakpoint line.
    Breakpoint(usize),
    /// Paused on request.
    Paused,
    Cancelled,
    /// `step` executed its line.
    Stepped,
    /// `max_steps_per_run` lines were advanced without finishing.
    StepLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub state: PlaybackState,
    pub stop: RunStop,
    pub lines_executed: u64,
    pub commands_executed: u64,
}

enum LineFlow {
    Next,
    Goto(usize),
    Terminate,
    Cancelled,
    Failed(NarrativeError),
}

/// Drives one compiled script line by line against its execution context.
#[derive(Debug)]
pub struct ScriptRunner {
    script: CompiledScript,
    commands: Vec<Option<Box<dyn Command>>>,
    context: ExecutionContext,
    services: ServiceRegistry,
    options: InterpreterOptions,
    /// Breakpoint line already reported; the next run executes it.
    resume_from_breakpoint: Option<usize>,
}

impl ScriptRunner {
    pub fn new(
        script: CompiledScript,
        registry: &CommandRegistry,
        services: ServiceRegistry,
        options: InterpreterOptions,
    ) -> Result<Self, NarrativeError> {
        let commands = script
            .lines
            .iter()
            .map(|line| match &line.kind {
                CompiledLineKind::Command(bound) => registry
                    .instantiate(bound)
                    .map(Some)
                    .map_err(|error| {
                        error.with_location(LineLocation::new(&script.name, line.index))
                    }),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut context = ExecutionContext::new(options.max_call_stack_depth);
        context.set_playback_speed(options.playback_speed);
        let mut runner = Self {
            script,
            commands,
            context,
            services,
            options,
            resume_from_breakpoint: None,
        };
        runner
            .context
            .load_script(&runner.script.name, runner.script.line_count());
        runner.register_labels()?;
        Ok(runner)
    }

    fn register_labels(&mut self) -> Result<(), NarrativeError> {
        for (name, index) in &self.script.labels {
            self.context.register_label(name, *index as i64)?;
        }
        Ok(())
    }

    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Mutable access for hosts that set breakpoints or seed variables.
    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    pub fn state(&self) -> PlaybackState {
        self.context.state()
    }

    /// Runs until the script ends, a breakpoint or pause is reached, `cancel`
    /// fires or a command fails fatally.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary, NarrativeError> {
        let limit = self.options.max_steps_per_run;
        self.drive(cancel, limit, true, RunStop::StepLimit).await
    }

    /// Executes exactly one line, ignoring breakpoints.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<RunSummary, NarrativeError> {
        self.drive(cancel, 1, false, RunStop::Stepped).await
    }

    /// Requests a pause after the line currently executing.
    pub fn pause(&mut self) {
        self.context.request_pause();
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.context.create_snapshot()
    }

    pub fn restore(&mut self, snapshot: ContextSnapshot) -> Result<(), NarrativeError> {
        self.context.restore_from_snapshot(snapshot)?;
        // A snapshot saved at a breakpoint resumes past it.
        let index = self.context.current_line_index();
        self.resume_from_breakpoint = self.context.has_breakpoint(index).then_some(index);
        Ok(())
    }

    /// Returns to `Idle` at line 0 with empty variables. Breakpoints stay.
    pub fn reset(&mut self) -> Result<(), NarrativeError> {
        self.context.reset();
        self.resume_from_breakpoint = None;
        self.register_labels()
    }

    async fn drive(
        &mut self,
        cancel: &CancellationToken,
        limit: u64,
        honor_breakpoints: bool,
        limit_stop: RunStop,
    ) -> Result<RunSummary, NarrativeError> {
        if self.context.state().is_terminal() {
            return Err(NarrativeError::new(
                "RUNNER_FINISHED",
                format!(
                    "Script \"{}\" is {}; reset it before running again.",
                    self.script.name,
                    self.context.state().as_str()
                ),
            ));
        }

        let token = self.context.begin_run(cancel);
        let lines_before = self.context.metrics().lines_executed;
        let commands_before = self.context.metrics().commands_executed;
        let result = self.drive_lines(&token, limit, honor_breakpoints, limit_stop).await;
        self.context.end_run();

        let stop = result?;
        let metrics = self.context.metrics();
        let summary = RunSummary {
            state: self.context.state(),
            stop,
            lines_executed: metrics.lines_executed.saturating_sub(lines_before),
            commands_executed: metrics.commands_executed.saturating_sub(commands_before),
        };
        tracing::debug!(
            script = %self.script.name,
            state = summary.state.as_str(),
            stop = ?summary.stop,
            lines = summary.lines_executed,
            "run returned"
        );
        Ok(summary)
    }

    async fn drive_lines(
        &mut self,
        token: &CancellationToken,
        limit: u64,
        honor_breakpoints: bool,
        limit_stop: RunStop,
    ) -> Result<RunStop, NarrativeError> {
        // An idle or paused runner cancelled before resuming stops where it is.
        if token.is_cancelled() {
            self.context.transition_to(PlaybackState::Stopped)?;
            return Ok(RunStop::Cancelled);
        }
        self.context.transition_to(PlaybackState::Playing)?;
        let mut steps = 0u64;

        loop {
            if token.is_cancelled() {
                self.context.transition_to(PlaybackState::Stopped)?;
                return Ok(RunStop::Cancelled);
            }

            let index = self.context.current_line_index();
            if index >= self.script.line_count() {
                self.context.transition_to(PlaybackState::Completed)?;
                return Ok(RunStop::Completed);
            }

            if honor_breakpoints
                && self.context.has_breakpoint(index)
                && self.resume_from_breakpoint != Some(index)
            {
                self.resume_from_breakpoint = Some(index);
                self.context.transition_to(PlaybackState::Paused)?;
                tracing::debug!(script = %self.script.name, line = index + 1, "breakpoint reached");
                return Ok(RunStop::Breakpoint(index));
            }

            if steps >= limit {
                self.context.transition_to(PlaybackState::Paused)?;
                return Ok(limit_stop);
            }
            steps += 1;
            self.resume_from_breakpoint = None;

            match self.execute_line(index, token).await {
                LineFlow::Next => self.context.advance(),
                LineFlow::Goto(target) => {
                    if let Err(error) = self.context.set_current_line(target) {
                        return self.fail(error.with_location(self.location(index)));
                    }
                }
                LineFlow::Terminate => {
                    self.context.transition_to(PlaybackState::Completed)?;
                    return Ok(RunStop::Completed);
                }
                LineFlow::Cancelled => {
                    self.context.transition_to(PlaybackState::Stopped)?;
                    return Ok(RunStop::Cancelled);
                }
                LineFlow::Failed(error) => return self.fail(error),
            }

            if self.context.take_pause_request() {
                self.context.transition_to(PlaybackState::Paused)?;
                return Ok(RunStop::Paused);
            }
        }
    }

    fn fail(&mut self, error: NarrativeError) -> Result<RunStop, NarrativeError> {
        tracing::error!(script = %self.script.name, error = %error, "script failed");
        self.context.transition_to(PlaybackState::Failed)?;
        Err(error)
    }

    fn location(&self, index: usize) -> LineLocation {
        LineLocation::new(&self.script.name, index)
    }

    async fn execute_line(&mut self, index: usize, token: &CancellationToken) -> LineFlow {
        self.context.metrics_mut().record_line();

        let dialogue = match self.script.line(index).map(|line| &line.kind) {
            None => return LineFlow::Next,
            Some(CompiledLineKind::Content(metadata)) => {
                if metadata.should_skip || !metadata.is_dialogue() {
                    return LineFlow::Next;
                }
                Some(metadata.clone())
            }
            Some(CompiledLineKind::Rejected(error)) => {
                return self.apply_binding_policy(error.clone(), true);
            }
            Some(CompiledLineKind::Command(bound)) => {
                if let Some(errors) = bound.error_text() {
                    let error = NarrativeError::at_line(
                        "RUNNER_BINDING",
                        format!("@{}: {}", bound.alias(), errors),
                        self.location(index),
                    );
                    if let Some(flow) = self.binding_flow(error, bound.is_fatal()) {
                        return flow;
                    }
                }
                None
            }
        };

        match dialogue {
            Some(metadata) => self.present_content(index, &metadata, token).await,
            None => self.execute_command(index, token).await,
        }
    }

    fn apply_binding_policy(&self, error: NarrativeError, fatal: bool) -> LineFlow {
        self.binding_flow(error, fatal).unwrap_or(LineFlow::Next)
    }

    /// `None` means the command should run anyway.
    fn binding_flow(&self, error: NarrativeError, fatal: bool) -> Option<LineFlow> {
        match self.options.binding_error_policy {
            BindingErrorPolicy::Abort => Some(LineFlow::Failed(error)),
            BindingErrorPolicy::Skip => {
                tracing::warn!(script = %self.script.name, error = %error, "skipping line");
                Some(LineFlow::Next)
            }
            BindingErrorPolicy::Warn if fatal => {
                tracing::warn!(script = %self.script.name, error = %error, "skipping line");
                Some(LineFlow::Next)
            }
            BindingErrorPolicy::Warn => {
                tracing::warn!(script = %self.script.name, error = %error, "running command with binding errors");
                None
            }
        }
    }

    async fn execute_command(&mut self, index: usize, token: &CancellationToken) -> LineFlow {
        let Some(command) = self.commands.get(index).and_then(Option::as_ref) else {
            return LineFlow::Next;
        };
        let descriptor = command.descriptor();
        let policy = ResiliencePolicy::from_descriptor(
            descriptor,
            self.options.default_timeout(),
            self.options.retry_base_delay(),
        );
        tracing::debug!(
            script = %self.script.name,
            line = index + 1,
            command = %descriptor.alias,
            "executing command"
        );

        let report = {
            let mut context = CommandContext::new(&mut self.context, &self.services, index);
            execute_with_policy(&**command, &mut context, &policy, token).await
        };

        let metrics = self.context.metrics_mut();
        metrics.record_command(&descriptor.category, report.elapsed, report.attempts);
        match report.resolution {
            Resolution::Succeeded(outcome) => self.follow(index, outcome),
            Resolution::Absorbed { .. } => {
                metrics.commands_failed += 1;
                metrics.commands_recovered += 1;
                LineFlow::Next
            }
            Resolution::Fatal(error) => {
                metrics.commands_failed += 1;
                let reason = match &error {
                    CommandError::Context(inner) => inner.message.clone(),
                    other => other.to_string(),
                };
                LineFlow::Failed(NarrativeError::at_line(
                    error.code().to_string(),
                    format!("@{} failed: {}", descriptor.alias, reason),
                    self.location(index),
                ))
            }
            Resolution::Cancelled => LineFlow::Cancelled,
        }
    }

    fn follow(&self, index: usize, outcome: CommandOutcome) -> LineFlow {
        let target = match outcome {
            CommandOutcome::Completed => return LineFlow::Next,
            CommandOutcome::Terminate => return LineFlow::Terminate,
            CommandOutcome::Jump(target) => target,
            CommandOutcome::Loop { target, iteration } => {
                tracing::debug!(script = %self.script.name, line = index + 1, iteration, "loop pass");
                target
            }
        };
        match target {
            JumpTarget::Line(line) => LineFlow::Goto(line),
            JumpTarget::Label(label) => match self.context.find_label(&label) {
                Some(line) => LineFlow::Goto(line),
                None => LineFlow::Failed(NarrativeError::at_line(
                    "RUNNER_LABEL_UNKNOWN",
                    format!("Label \"{}\" is not defined.", label),
                    self.location(index),
                )),
            },
        }
    }

    /// Sends a dialogue line to the narration capability when one is
    /// registered. Presentation failures are logged and the line is skipped.
    async fn present_content(
        &mut self,
        index: usize,
        metadata: &LineMetadata,
        token: &CancellationToken,
    ) -> LineFlow {
        let Some(narration) = self.services.get::<dyn NarrationService>() else {
            return LineFlow::Next;
        };
        let text = if metadata.has_variables {
            render_variables(&metadata.processed_text, self.context.variables())
        } else {
            metadata.processed_text.clone()
        };
        let line = PresentedLine {
            script: self.script.name.clone(),
            line_index: index,
            content_type: metadata.content_type,
            speaker: metadata.speaker_id.clone(),
            text,
            attributes: metadata.attributes.clone(),
        };

        let presented = tokio::select! {
            biased;
            _ = token.cancelled() => return LineFlow::Cancelled,
            result = narration.present(&line, token) => result,
        };
        if let Err(error) = presented {
            if token.is_cancelled() {
                return LineFlow::Cancelled;
            }
            tracing::warn!(script = %self.script.name, line = index + 1, error = %error, "narration failed");
        }
        LineFlow::Next
    }
}
