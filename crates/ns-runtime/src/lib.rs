mod command;
mod commands;
mod context;
mod helpers;
mod options;
mod registry;
mod resilience;
mod runner;
mod services;
mod snapshot;

pub use command::{Command, CommandContext, CommandError, CommandOutcome, JumpTarget};
pub use commands::{
    register_builtins, AddCommand, CallCommand, GotoCommand, IfCommand, PauseCommand,
    PersistCommand, PrintCommand, RepeatCommand, ReturnCommand, SetCommand, StopCommand,
    WaitCommand, MAX_WAIT_SECS,
};
pub use context::{ExecutionContext, DEFAULT_MAX_CALL_STACK_DEPTH};
pub use options::{BindingErrorPolicy, InterpreterOptions, MAX_TIMEOUT_SECS};
pub use registry::{CommandFactory, CommandParser, CommandRegistry, ParseOutcome};
pub use resilience::{execute_with_policy, ExecutionReport, ResiliencePolicy, Resolution};
pub use runner::{RunStop, RunSummary, ScriptRunner};
pub use services::{
    MemoryVariableStore, NarrationService, PersistentVariableService, PresentedLine,
    RecordingNarration, ServiceRegistry, NARRATION_CAPABILITY, PERSISTENT_VARIABLES_CAPABILITY,
};
