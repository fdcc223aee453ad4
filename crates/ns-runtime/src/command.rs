use std::fmt;

use async_trait::async_trait;
use ns_compiler::CommandDescriptor;
use ns_core::NarrativeError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::services::ServiceRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    Line(usize),
    Label(String),
}

/// What a successfully executed command asks of the driving loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Jump(JumpTarget),
    /// Jump back for another loop pass; `iteration` counts passes so far.
    Loop { target: JumpTarget, iteration: u32 },
    Terminate,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {seconds}s")]
    Timeout { seconds: f64 },
    #[error("cancelled")]
    Cancelled,
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("call stack overflow at depth {depth}")]
    CallStackOverflow { depth: usize },
    #[error(transparent)]
    Context(#[from] NarrativeError),
}

impl CommandError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Timeout { .. } | Self::Context(_))
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Failed(_) => "COMMAND_FAILED",
            Self::Timeout { .. } => "COMMAND_TIMEOUT",
            Self::Cancelled => "COMMAND_CANCELLED",
            Self::InvalidParameter { .. } => "COMMAND_INVALID_PARAMETER",
            Self::CallStackOverflow { .. } => "CONTEXT_CALL_STACK_OVERFLOW",
            Self::Context(error) => &error.code,
        }
    }
}

/// Everything a command may touch while it runs.
pub struct CommandContext<'a> {
    pub execution: &'a mut ExecutionContext,
    pub services: &'a ServiceRegistry,
    /// Line the command sits on.
    pub line_index: usize,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        execution: &'a mut ExecutionContext,
        services: &'a ServiceRegistry,
        line_index: usize,
    ) -> Self {
        Self {
            execution,
            services,
            line_index,
        }
    }

    pub fn script_name(&self) -> &str {
        self.execution.script_name().unwrap_or_default()
    }
}

#[async_trait]
pub trait Command: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &CommandDescriptor;

    /// Runs one attempt. May be called again by the retry policy, so
    /// implementations must tolerate repeated execution.
    async fn execute(
        &self,
        context: &mut CommandContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, CommandError>;
}
