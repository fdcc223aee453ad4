use std::collections::BTreeMap;

use ns_core::{ContentType, LineLocation, LineMetadata, NarrativeError};
use ns_parser::{command_alias, LineClassifier};
use serde::{Deserialize, Serialize};

use crate::binder::{BoundCommand, CommandBinder};
use crate::descriptor::DescriptorTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Recognize registered aliases without a leading `@`.
    pub allow_bare_aliases: bool,
    pub literal_cache_capacity: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            allow_bare_aliases: true,
            literal_cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: NarrativeError,
    pub fatal: bool,
}

#[derive(Debug, Clone)]
pub enum CompiledLineKind {
    Content(LineMetadata),
    Command(BoundCommand),
    /// A command line that could not be tokenized or resolved.
    Rejected(NarrativeError),
}

#[derive(Debug, Clone)]
pub struct CompiledLine {
    pub index: usize,
    pub raw: String,
    pub kind: CompiledLineKind,
}

impl CompiledLine {
    pub fn metadata(&self) -> Option<&LineMetadata> {
        match &self.kind {
            CompiledLineKind::Content(metadata) => Some(metadata),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&BoundCommand> {
        match &self.kind {
            CompiledLineKind::Command(command) => Some(command),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub name: String,
    pub lines: Vec<CompiledLine>,
    pub labels: BTreeMap<String, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledScript {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&CompiledLine> {
        self.lines.get(index)
    }

    pub fn has_fatal_diagnostics(&self) -> bool {
        self.diagnostics.iter().any(|diagnostic| diagnostic.fatal)
    }
}

/// Compiles script text line by line. Problems on one line are recorded as
/// diagnostics and never stop the remaining lines from compiling.
pub fn compile_script(
    name: &str,
    source: &str,
    table: &DescriptorTable,
    options: &CompileOptions,
) -> CompiledScript {
    let mut binder = CommandBinder::new(table.clone(), options.literal_cache_capacity);
    compile_with_binder(name, source, &mut binder, options)
}

pub fn compile_with_binder(
    name: &str,
    source: &str,
    binder: &mut CommandBinder,
    options: &CompileOptions,
) -> CompiledScript {
    let mut classifier = LineClassifier::new();
    let mut lines = Vec::new();
    let mut labels = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let location = LineLocation::new(name, index);
        let trimmed = raw.trim();

        let kind = if trimmed.starts_with('@') {
            compile_command(trimmed, &location, binder, &mut diagnostics)
        } else if let Some(command) = bare_command(trimmed, binder, options) {
            push_binding_diagnostics(&command, &location, &mut diagnostics);
            CompiledLineKind::Command(command)
        } else {
            let metadata = classifier.classify_at(raw, location.clone());
            for error in classifier.take_errors() {
                diagnostics.push(Diagnostic {
                    error,
                    fatal: false,
                });
            }
            if metadata.content_type == ContentType::Label {
                if let Some(label) = &metadata.label_name {
                    if labels.insert(label.clone(), index).is_some() {
                        diagnostics.push(Diagnostic {
                            error: NarrativeError::at_line(
                                "COMPILE_DUPLICATE_LABEL",
                                format!("Label \"{}\" is defined more than once; the last one wins.", label),
                                location.clone(),
                            ),
                            fatal: false,
                        });
                    }
                }
            }
            CompiledLineKind::Content(metadata)
        };

        lines.push(CompiledLine {
            index,
            raw: raw.to_string(),
            kind,
        });
    }

    tracing::debug!(
        script = name,
        lines = lines.len(),
        labels = labels.len(),
        diagnostics = diagnostics.len(),
        "compiled script"
    );

    CompiledScript {
        name: name.to_string(),
        lines,
        labels,
        diagnostics,
    }
}

fn compile_command(
    text: &str,
    location: &LineLocation,
    binder: &mut CommandBinder,
    diagnostics: &mut Vec<Diagnostic>,
) -> CompiledLineKind {
    match binder.bind(text, 0) {
        Ok(command) => {
            push_binding_diagnostics(&command, location, diagnostics);
            CompiledLineKind::Command(command)
        }
        Err(error) => {
            let error = error.with_location(location.clone());
            diagnostics.push(Diagnostic {
                error: error.clone(),
                fatal: true,
            });
            CompiledLineKind::Rejected(error)
        }
    }
}

const FLOW_CATEGORY: &str = "flow";

/// A line without `@` is a command only when its first word is a registered
/// non-flow alias and every fragment binds without fatal errors; otherwise it
/// stays prose. Flow commands always need the `@` marker.
fn bare_command(
    text: &str,
    binder: &mut CommandBinder,
    options: &CompileOptions,
) -> Option<BoundCommand> {
    if !options.allow_bare_aliases {
        return None;
    }
    let alias = command_alias(text)?;
    if !binder.is_command_alias(&alias) {
        return None;
    }
    let command = binder.bind(text, 0).ok()?;
    if command.descriptor.category == FLOW_CATEGORY {
        return None;
    }
    (!command.is_fatal() && command.ignored_fragments == 0).then_some(command)
}

fn push_binding_diagnostics(
    command: &BoundCommand,
    location: &LineLocation,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let fatal = command.is_fatal();
    for message in &command.errors {
        let code = if message.starts_with("Missing required") {
            "BIND_REQUIRED_MISSING"
        } else {
            "BIND_PARAMETER"
        };
        diagnostics.push(Diagnostic {
            error: NarrativeError::at_line(code, message.clone(), location.clone()),
            fatal: fatal && code == "BIND_REQUIRED_MISSING",
        });
    }
}
