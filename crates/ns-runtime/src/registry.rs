use std::collections::BTreeMap;

use ns_compiler::{BoundCommand, CommandBinder, CommandDescriptor, DescriptorTable};
use ns_core::NarrativeError;

use crate::command::Command;
use crate::commands::register_builtins;

/// Builds a runnable command from a bound command line.
pub type CommandFactory = fn(&BoundCommand) -> Box<dyn Command>;

/// Descriptor table plus the factory for every registered command.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    table: DescriptorTable,
    factories: BTreeMap<String, CommandFactory>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Result<Self, NarrativeError> {
        let mut registry = Self::new();
        register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        descriptor: CommandDescriptor,
        factory: CommandFactory,
    ) -> Result<(), NarrativeError> {
        let alias = descriptor.alias.to_ascii_lowercase();
        self.table.register(descriptor)?;
        self.factories.insert(alias, factory);
        Ok(())
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn instantiate(&self, bound: &BoundCommand) -> Result<Box<dyn Command>, NarrativeError> {
        let factory = self
            .factories
            .get(&bound.alias().to_ascii_lowercase())
            .ok_or_else(|| {
                NarrativeError::new(
                    "RUNNER_COMMAND_UNREGISTERED",
                    format!("No factory is registered for command \"{}\".", bound.alias()),
                )
            })?;
        Ok(factory(bound))
    }
}

/// Result of parsing one command line into a runnable command.
#[derive(Debug)]
pub struct ParseOutcome {
    pub command: Option<Box<dyn Command>>,
    /// Newline-joined error messages, `None` when parsing was clean.
    pub errors: Option<String>,
    /// Set for unknown aliases, bad quoting and missing required parameters.
    pub fatal: bool,
}

impl ParseOutcome {
    fn rejected(error: NarrativeError) -> Self {
        Self {
            command: None,
            errors: Some(error.message),
            fatal: true,
        }
    }
}

/// Parses single command lines outside script compilation.
#[derive(Debug, Clone)]
pub struct CommandParser {
    registry: CommandRegistry,
    binder: CommandBinder,
}

impl CommandParser {
    pub fn new(registry: CommandRegistry, cache_capacity: usize) -> Self {
        let binder = CommandBinder::new(registry.table().clone(), cache_capacity);
        Self { registry, binder }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn parse(
        &mut self,
        script_name: &str,
        line_index: usize,
        inline_index: usize,
        text: &str,
    ) -> ParseOutcome {
        let bound = match self.binder.bind(text, inline_index) {
            Ok(bound) => bound,
            Err(error) => {
                tracing::warn!(script = script_name, line = line_index + 1, error = %error, "command rejected");
                return ParseOutcome::rejected(error);
            }
        };

        let errors = bound.error_text();
        if let Some(errors) = &errors {
            tracing::warn!(
                script = script_name,
                line = line_index + 1,
                command = bound.alias(),
                errors = %errors,
                "command bound with errors"
            );
        }

        match self.registry.instantiate(&bound) {
            Ok(command) => ParseOutcome {
                command: Some(command),
                errors,
                fatal: bound.is_fatal(),
            },
            Err(error) => ParseOutcome::rejected(error),
        }
    }
}
