mod dialogue;
mod flow;
mod timing;
mod variables;

pub use dialogue::PrintCommand;
pub use flow::{
    CallCommand, GotoCommand, IfCommand, PauseCommand, RepeatCommand, ReturnCommand, StopCommand,
};
pub use timing::{WaitCommand, MAX_WAIT_SECS};
pub use variables::{AddCommand, PersistCommand, SetCommand};

use ns_core::NarrativeError;

use crate::registry::CommandRegistry;

pub fn register_builtins(registry: &mut CommandRegistry) -> Result<(), NarrativeError> {
    registry.register(SetCommand::descriptor(), SetCommand::from_bound)?;
    registry.register(AddCommand::descriptor(), AddCommand::from_bound)?;
    registry.register(PersistCommand::descriptor(), PersistCommand::from_bound)?;
    registry.register(GotoCommand::descriptor(), GotoCommand::from_bound)?;
    registry.register(CallCommand::descriptor(), CallCommand::from_bound)?;
    registry.register(ReturnCommand::descriptor(), ReturnCommand::from_bound)?;
    registry.register(IfCommand::descriptor(), IfCommand::from_bound)?;
    registry.register(RepeatCommand::descriptor(), RepeatCommand::from_bound)?;
    registry.register(StopCommand::descriptor(), StopCommand::from_bound)?;
    registry.register(PauseCommand::descriptor(), PauseCommand::from_bound)?;
    registry.register(WaitCommand::descriptor(), WaitCommand::from_bound)?;
    registry.register(PrintCommand::descriptor(), PrintCommand::from_bound)?;
    Ok(())
}
